use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{LicensingError, Result};
use crate::models::{
    CatalogHealth, CatalogStats, IssueSeverity, ModuleDescriptor, ModuleRecord, ValidationIssue,
    ValidationIssueType,
};

/// Core trait for the persisted module catalog.
///
/// Rows are seeded once from static configuration and then only toggled;
/// `set_enabled` is the single mutating primitive. Guard logic lives in the
/// manager, not here.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert descriptors that are not yet present (disabled) and refresh
    /// the descriptor fields of those that are, keeping their enabled flag.
    /// Returns the number of newly inserted rows.
    async fn seed(&mut self, descriptors: Vec<ModuleDescriptor>) -> Result<usize>;

    /// List all catalog rows.
    async fn list_modules(&self) -> Result<Vec<ModuleRecord>>;

    /// Get a specific catalog row.
    async fn get_module(&self, key: &str) -> Result<Option<ModuleRecord>>;

    /// Flip the persisted enabled flag. Errors with `ModuleNotFound` for
    /// unknown keys and `PersistenceFailure` when the write fails.
    async fn set_enabled(&mut self, key: &str, enabled: bool) -> Result<()>;

    /// Get statistics about the catalog
    async fn stats(&self) -> Result<CatalogStats>;

    /// Get catalog health information (generic across implementations)
    async fn health(&self) -> Result<CatalogHealth>;

    /// Check declared dependencies for consistency: unknown keys, self-loops,
    /// and enabled modules whose direct dependencies are disabled. Reporting
    /// only; nothing is auto-fixed.
    async fn validate_catalog(&self) -> Result<Vec<ValidationIssue>>;
}

/// JSON-based catalog data structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonCatalog {
    modules: HashMap<String, ModuleRecord>,
    last_updated: DateTime<Utc>,
    version: String,
}

impl Default for JsonCatalog {
    fn default() -> Self {
        Self {
            modules: HashMap::new(),
            last_updated: Utc::now(),
            version: "1.0".to_string(),
        }
    }
}

/// Local file-system based catalog store implementation
pub struct JsonCatalogStore {
    catalog_path: PathBuf,
    backup_path: PathBuf,
    data_dir: PathBuf,
    catalog: JsonCatalog,
}

impl JsonCatalogStore {
    /// Create a new JsonCatalogStore with explicit data directory
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let catalog_path = data_dir.join("catalog.json");
        let backup_path = data_dir.join("catalog.json.backup");

        fs::create_dir_all(&data_dir).await?;

        let mut store = Self {
            catalog_path,
            backup_path,
            data_dir,
            catalog: JsonCatalog::default(),
        };

        store.load_catalog().await?;
        Ok(store)
    }

    /// Create a new JsonCatalogStore with OS-specific default directory
    pub async fn new_with_defaults() -> Result<Self> {
        let data_dir = Self::default_data_dir()?;
        Self::new(data_dir).await
    }

    /// Get the default data directory for the current OS
    ///
    /// Returns an error if the system directories cannot be determined
    pub fn default_data_dir() -> Result<PathBuf> {
        use directories::ProjectDirs;

        let project_dirs = ProjectDirs::from("com", "campus", "campus").ok_or_else(|| {
            LicensingError::CorruptedCatalog(
                "could not determine system directories for current user/OS".to_string(),
            )
        })?;

        Ok(project_dirs.data_local_dir().join("modules"))
    }

    /// Get the data directory managed by this store
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the catalog file path
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// Load catalog from disk
    async fn load_catalog(&mut self) -> Result<()> {
        if !self.catalog_path.exists() {
            info!("No existing catalog found, creating new one");
            return Ok(());
        }

        match fs::read_to_string(&self.catalog_path).await {
            Ok(content) => {
                self.catalog = serde_json::from_str(&content)
                    .map_err(|e| LicensingError::CorruptedCatalog(e.to_string()))?;
                debug!("Loaded catalog with {} modules", self.catalog.modules.len());
            }
            Err(_) => {
                warn!("Failed to load catalog, checking backup");
                if self.backup_path.exists() {
                    let backup_content = fs::read_to_string(&self.backup_path).await?;
                    self.catalog = serde_json::from_str(&backup_content)
                        .map_err(|e| LicensingError::CorruptedCatalog(e.to_string()))?;
                    info!("Restored catalog from backup");
                }
            }
        }
        Ok(())
    }

    /// Save catalog to disk with atomic backup
    async fn save_catalog(&mut self) -> Result<()> {
        self.catalog.last_updated = Utc::now();

        let content = serde_json::to_string_pretty(&self.catalog).map_err(|e| {
            LicensingError::PersistenceFailure {
                operation: "serialize catalog".to_string(),
                source: Box::new(e),
            }
        })?;

        if self.catalog_path.exists() {
            if let Err(e) = fs::copy(&self.catalog_path, &self.backup_path).await {
                warn!("Failed to create catalog backup: {}", e);
            }
        }

        fs::write(&self.catalog_path, content).await.map_err(|e| {
            LicensingError::PersistenceFailure {
                operation: "write catalog".to_string(),
                source: Box::new(e),
            }
        })?;
        debug!("Catalog saved successfully");
        Ok(())
    }

    fn calculate_stats(&self) -> CatalogStats {
        let total_modules = self.catalog.modules.len();
        let enabled_modules = self
            .catalog
            .modules
            .values()
            .filter(|module| module.enabled)
            .count();
        let last_updated = self
            .catalog
            .modules
            .values()
            .filter_map(|module| module.last_toggled)
            .max();

        CatalogStats {
            total_modules,
            enabled_modules,
            last_updated,
        }
    }

    /// Validate a module key before it reaches storage
    fn validate_module_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(LicensingError::InvalidModuleKey(
                "key cannot be empty".to_string(),
            ));
        }

        if key.contains("..") || key.contains('/') || key.contains('\\') {
            return Err(LicensingError::InvalidModuleKey(
                "key contains invalid path characters".to_string(),
            ));
        }

        if key.len() > 64 {
            return Err(LicensingError::InvalidModuleKey("key too long".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl CatalogStore for JsonCatalogStore {
    async fn seed(&mut self, descriptors: Vec<ModuleDescriptor>) -> Result<usize> {
        let mut inserted = 0;

        for descriptor in descriptors {
            Self::validate_module_key(&descriptor.key)?;
            if descriptor.depends_on(&descriptor.key) {
                return Err(LicensingError::SelfDependency(descriptor.key));
            }

            match self.catalog.modules.get_mut(&descriptor.key) {
                Some(existing) => {
                    // Reseeding refreshes the descriptor but never touches
                    // the persisted toggle state.
                    existing.descriptor = descriptor;
                }
                None => {
                    let key = descriptor.key.clone();
                    self.catalog
                        .modules
                        .insert(key, ModuleRecord::from_descriptor(descriptor));
                    inserted += 1;
                }
            }
        }

        if inserted > 0 {
            info!("Seeded {} new modules into the catalog", inserted);
        }
        self.save_catalog().await?;
        Ok(inserted)
    }

    async fn list_modules(&self) -> Result<Vec<ModuleRecord>> {
        Ok(self.catalog.modules.values().cloned().collect())
    }

    async fn get_module(&self, key: &str) -> Result<Option<ModuleRecord>> {
        Self::validate_module_key(key)?;
        Ok(self.catalog.modules.get(key).cloned())
    }

    async fn set_enabled(&mut self, key: &str, enabled: bool) -> Result<()> {
        Self::validate_module_key(key)?;

        let module = self
            .catalog
            .modules
            .get_mut(key)
            .ok_or_else(|| LicensingError::ModuleNotFound(key.to_string()))?;

        module.mark_toggled(enabled);
        self.save_catalog().await?;

        info!(
            "Module '{}' {}",
            key,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    async fn stats(&self) -> Result<CatalogStats> {
        Ok(self.calculate_stats())
    }

    async fn health(&self) -> Result<CatalogHealth> {
        let stats = self.calculate_stats();
        let mut health = CatalogHealth::healthy(stats.total_modules);

        health.implementation_info.insert(
            "catalog_file".to_string(),
            serde_json::Value::String(self.catalog_path.display().to_string()),
        );
        health.implementation_info.insert(
            "data_directory".to_string(),
            serde_json::Value::String(self.data_dir.display().to_string()),
        );
        health.implementation_info.insert(
            "enabled_modules".to_string(),
            serde_json::Value::Number(serde_json::Number::from(stats.enabled_modules)),
        );
        health.last_updated = stats.last_updated;

        Ok(health)
    }

    async fn validate_catalog(&self) -> Result<Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        for module in self.catalog.modules.values() {
            for dep in module.dependencies() {
                if dep == module.key() {
                    issues.push(ValidationIssue {
                        module_key: module.key().to_string(),
                        issue_type: ValidationIssueType::SelfDependency,
                        description: "module declares a dependency on itself".to_string(),
                        severity: IssueSeverity::Critical,
                    });
                    continue;
                }

                match self.catalog.modules.get(dep) {
                    None => {
                        issues.push(ValidationIssue {
                            module_key: module.key().to_string(),
                            issue_type: ValidationIssueType::UnknownDependency,
                            description: format!("dependency '{}' is not in the catalog", dep),
                            severity: IssueSeverity::Error,
                        });
                    }
                    Some(dep_module) => {
                        // Enable-time checks are direct-only; an enabled
                        // module above a disabled dependency can only come
                        // from hand-edited data. Report, never fix.
                        if module.enabled && !dep_module.enabled {
                            issues.push(ValidationIssue {
                                module_key: module.key().to_string(),
                                issue_type: ValidationIssueType::InconsistentState,
                                description: format!(
                                    "module is enabled but dependency '{}' is disabled",
                                    dep
                                ),
                                severity: IssueSeverity::Warning,
                            });
                        }
                    }
                }
            }
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::default_catalog;
    use tempfile::TempDir;

    fn descriptor(key: &str, name: &str, deps: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor::new(key, name)
            .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
    }

    #[tokio::test]
    async fn seed_inserts_disabled_rows() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();

        let inserted = store.seed(default_catalog()).await.unwrap();
        assert_eq!(inserted, default_catalog().len());

        for module in store.list_modules().await.unwrap() {
            assert!(!module.enabled);
        }
    }

    #[tokio::test]
    async fn reseed_keeps_toggle_state() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();

        store
            .seed(vec![descriptor("library", "Library", &[])])
            .await
            .unwrap();
        store.set_enabled("library", true).await.unwrap();

        // Reseed with an updated display name.
        let inserted = store
            .seed(vec![descriptor("library", "Library & Media", &[])])
            .await
            .unwrap();
        assert_eq!(inserted, 0);

        let module = store.get_module("library").await.unwrap().unwrap();
        assert!(module.enabled);
        assert_eq!(module.name(), "Library & Media");
    }

    #[tokio::test]
    async fn seed_rejects_self_dependency() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();

        let err = store
            .seed(vec![descriptor("hostel", "Hostel", &["hostel"])])
            .await
            .unwrap_err();
        assert!(matches!(err, LicensingError::SelfDependency(_)));
    }

    #[tokio::test]
    async fn set_enabled_rejects_unknown_modules() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();

        let err = store.set_enabled("missing", true).await.unwrap_err();
        assert!(matches!(err, LicensingError::ModuleNotFound(_)));
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();

        assert!(store.get_module("").await.is_err());
        assert!(store.get_module("../escape").await.is_err());
        assert!(store.get_module(&"k".repeat(65)).await.is_err());
    }

    #[tokio::test]
    async fn catalog_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();
            store.seed(default_catalog()).await.unwrap();
            store.set_enabled("library", true).await.unwrap();
        }

        let store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();
        let module = store.get_module("library").await.unwrap().unwrap();
        assert!(module.enabled);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.enabled_modules, 1);
        assert!(stats.last_updated.is_some());
    }

    #[tokio::test]
    async fn validate_catalog_reports_issues() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();

        store
            .seed(vec![
                descriptor("online_learning", "Online Learning", &[]),
                descriptor("advanced_reporting", "Advanced Reporting", &["online_learning"]),
                descriptor("broken", "Broken", &["no_such_module"]),
            ])
            .await
            .unwrap();

        let issues = store.validate_catalog().await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, ValidationIssueType::UnknownDependency);
        assert_eq!(issues[0].module_key, "broken");

        // Hand-edit: dependent enabled over a disabled dependency.
        store.set_enabled("advanced_reporting", true).await.unwrap();
        let issues = store.validate_catalog().await.unwrap();
        assert!(issues
            .iter()
            .any(|i| i.issue_type == ValidationIssueType::InconsistentState
                && i.module_key == "advanced_reporting"));
    }

    #[tokio::test]
    async fn health_reports_paths() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = JsonCatalogStore::new(temp_dir.path()).await.unwrap();
        store.seed(default_catalog()).await.unwrap();

        let health = store.health().await.unwrap();
        assert!(health.healthy);
        assert_eq!(health.total_modules, default_catalog().len());
        assert!(health.implementation_info.contains_key("catalog_file"));
    }
}
