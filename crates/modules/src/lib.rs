//! Campus Modules - license-gated feature module management
//!
//! This crate implements the module licensing and enablement subsystem of the
//! Campus school-management product: a catalog of optional feature modules
//! with declared dependencies, gated behind a validated license.
//!
//! # Features
//!
//! - **Module catalog**: seeded from static configuration, persisted toggle
//!   state, rows never deleted
//! - **Dependency gating**: a module enables only when its direct
//!   dependencies are enabled, and disables only when no enabled module
//!   still depends on it
//! - **License store**: TTL-cached license record validated against an
//!   external authority, degrading to cached state on failure
//! - **Explicit cache invalidation**: operator-triggered license cache clear
//!   and module snapshot refresh
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use campus_modules::{
//!     CatalogConfig, CachedLicenseStore, JsonCatalogStore, ModuleManager, StaticAuthority,
//! };
//! use campus_modules::catalog::CatalogStore;
//!
//! # async fn example() -> campus_modules::Result<()> {
//! let data_dir = std::path::PathBuf::from("./data");
//!
//! let license = Arc::new(
//!     CachedLicenseStore::new(&data_dir, Box::new(StaticAuthority::new()), CatalogConfig::default())
//!         .await?,
//! );
//! let mut catalog = JsonCatalogStore::new(&data_dir).await?;
//! catalog.seed(campus_modules::default_catalog()).await?;
//!
//! let mut manager = ModuleManager::new(Box::new(catalog), license);
//! manager.validate_license("CAMPUS-1234-5678-9ABC").await?;
//! manager.enable_module("library").await?;
//! # Ok(())
//! # }
//! ```

pub mod authority;
pub mod catalog;
pub mod error;
pub mod license;
pub mod manager;
pub mod models;
pub mod seed;

// Re-export commonly used types
pub use authority::{AuthorityResponse, LicenseAuthority, StaticAuthority};
pub use catalog::{CatalogStore, JsonCatalogStore};
pub use error::{LicensingError, Result};
pub use license::{validate_license_key, CachedLicenseStore, LicenseStore};
pub use manager::ModuleManager;
pub use models::{
    CatalogConfig, CatalogHealth, CatalogStats, IssueSeverity, LicenseRecord, ModuleDescriptor,
    ModuleRecord, ModuleStatus, SeatLimits, ValidationIssue, ValidationIssueType,
};
pub use seed::default_catalog;

#[cfg(feature = "http")]
pub use authority::HttpLicenseAuthority;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize a module manager with default configuration
///
/// Seeds the built-in catalog into `data_dir` and wires a cached license
/// store over the given authority. Suitable for most deployments; compose
/// the pieces by hand for custom stores or configuration.
pub async fn init_default(
    data_dir: std::path::PathBuf,
    authority: Box<dyn LicenseAuthority>,
) -> Result<ModuleManager> {
    use std::sync::Arc;

    let license = Arc::new(
        CachedLicenseStore::new(&data_dir, authority, CatalogConfig::default()).await?,
    );

    let mut catalog = JsonCatalogStore::new(&data_dir).await?;
    catalog.seed(default_catalog()).await?;

    Ok(ModuleManager::new(Box::new(catalog), license))
}
