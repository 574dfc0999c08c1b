use thiserror::Error;

#[derive(Error, Debug)]
pub enum LicensingError {
    #[error("Module '{0}' not found in the catalog")]
    ModuleNotFound(String),

    #[error("Module '{0}' is not covered by the current license")]
    NotLicensed(String),

    #[error("Cannot enable '{module}': required modules are disabled: {}", .missing.join(", "))]
    DependencyUnmet {
        module: String,
        missing: Vec<String>,
    },

    #[error("Cannot disable '{module}': still required by enabled modules: {}", .dependents.join(", "))]
    DependentsStillEnabled {
        module: String,
        dependents: Vec<String>,
    },

    #[error("License validation failed: {0}")]
    LicenseValidationFailed(String),

    #[error("License authority unavailable: {0}")]
    AuthorityUnavailable(String),

    #[error("Persistence operation '{operation}' failed: {source}")]
    PersistenceFailure {
        operation: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid module key: {0}")]
    InvalidModuleKey(String),

    #[error("Invalid license key: {0}")]
    InvalidLicenseKey(String),

    #[error("Module '{0}' declares a dependency on itself")]
    SelfDependency(String),

    #[error("Corrupted catalog: {0}")]
    CorruptedCatalog(String),

    #[error("Corrupted license cache: {0}")]
    CorruptedLicenseCache(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Timeout error: license authority call timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, LicensingError>;

impl LicensingError {
    /// Errors that may succeed on retry without operator intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LicensingError::AuthorityUnavailable(_) | LicensingError::Timeout
        )
    }

    /// Errors caused by operator input rather than system state.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            LicensingError::ModuleNotFound(_)
                | LicensingError::NotLicensed(_)
                | LicensingError::DependencyUnmet { .. }
                | LicensingError::DependentsStillEnabled { .. }
                | LicensingError::LicenseValidationFailed(_)
                | LicensingError::InvalidModuleKey(_)
                | LicensingError::InvalidLicenseKey(_)
        )
    }
}
