use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::CatalogStore;
use crate::error::{LicensingError, Result};
use crate::license::LicenseStore;
use crate::models::{
    CatalogHealth, CatalogStats, LicenseRecord, ModuleRecord, ModuleStatus, ValidationIssue,
};

/// Central manager for module enable/disable transitions.
///
/// Owns the catalog store and a handle to the license store, plus a memoized
/// module snapshot used to answer dependency queries quickly. Toggle
/// operations take `&mut self` and run guard and flag flip in one call, so
/// sessions sharing a manager behind a lock cannot interleave check-then-act.
pub struct ModuleManager {
    catalog: Box<dyn CatalogStore>,
    license: Arc<dyn LicenseStore>,
    snapshot: Option<HashMap<String, ModuleRecord>>,
    license_generation: u64,
}

impl ModuleManager {
    pub fn new(catalog: Box<dyn CatalogStore>, license: Arc<dyn LicenseStore>) -> Self {
        Self {
            catalog,
            license,
            snapshot: None,
            license_generation: 0,
        }
    }

    /// Get the license store handle
    pub fn license_store(&self) -> &dyn LicenseStore {
        self.license.as_ref()
    }

    /// Drop the memoized module snapshot so subsequent queries re-read from
    /// persisted storage.
    pub fn refresh_cache(&mut self) {
        self.snapshot = None;
    }

    async fn snapshot(&mut self) -> Result<&HashMap<String, ModuleRecord>> {
        // A license change means licensed-status must be re-derived; drop the
        // snapshot along with it.
        let generation = self.license.cache_generation();
        if generation != self.license_generation {
            self.license_generation = generation;
            self.snapshot = None;
        }

        if self.snapshot.is_none() {
            let modules = self.catalog.list_modules().await?;
            debug!("Rebuilt module snapshot with {} entries", modules.len());
            self.snapshot = Some(
                modules
                    .into_iter()
                    .map(|module| (module.key().to_string(), module))
                    .collect(),
            );
        }

        Ok(&*self.snapshot.get_or_insert_with(HashMap::new))
    }

    async fn require_module(&mut self, key: &str) -> Result<ModuleRecord> {
        self.snapshot()
            .await?
            .get(key)
            .cloned()
            .ok_or_else(|| LicensingError::ModuleNotFound(key.to_string()))
    }

    /// Display names of direct dependencies of `module` that are not enabled.
    /// Direct lookup only; transitive state is maintained incrementally at
    /// each dependency's own enable time, not re-derived here.
    async fn missing_dependencies(&mut self, module: &ModuleRecord) -> Result<Vec<String>> {
        let dependencies = module.dependencies().to_vec();
        let snapshot = self.snapshot().await?;

        let mut missing = Vec::new();
        for dep in dependencies {
            match snapshot.get(&dep) {
                Some(record) if record.enabled => {}
                Some(record) => missing.push(record.name().to_string()),
                // Undeclared key: no display name to resolve to.
                None => missing.push(dep),
            }
        }
        Ok(missing)
    }

    /// True iff every direct dependency of `key` is currently enabled.
    pub async fn check_dependencies(&mut self, key: &str) -> Result<bool> {
        let module = self.require_module(key).await?;
        Ok(self.missing_dependencies(&module).await?.is_empty())
    }

    /// All modules whose dependency list contains `key`, in any state.
    pub async fn get_dependents(&mut self, key: &str) -> Result<Vec<ModuleRecord>> {
        let snapshot = self.snapshot().await?;
        let mut dependents: Vec<ModuleRecord> = snapshot
            .values()
            .filter(|module| module.descriptor.depends_on(key))
            .cloned()
            .collect();
        dependents.sort_by(|a, b| a.descriptor.order.cmp(&b.descriptor.order));
        Ok(dependents)
    }

    /// Transition a module to Enabled.
    ///
    /// Requires the module to be licensed and every direct dependency
    /// enabled; rejections name the blocking modules. Enabling an enabled
    /// module is a no-op. No partial state change occurs.
    pub async fn enable_module(&mut self, key: &str) -> Result<()> {
        let module = self.require_module(key).await?;

        if module.enabled {
            debug!("Module '{}' already enabled", key);
            return Ok(());
        }

        if !self.license.is_module_licensed(key).await {
            return Err(LicensingError::NotLicensed(module.name().to_string()));
        }

        let missing = self.missing_dependencies(&module).await?;
        if !missing.is_empty() {
            return Err(LicensingError::DependencyUnmet {
                module: module.name().to_string(),
                missing,
            });
        }

        self.catalog.set_enabled(key, true).await?;
        self.refresh_cache();
        info!("Enabled module '{}'", key);
        Ok(())
    }

    /// Transition a module to Disabled.
    ///
    /// Requires that no enabled module lists `key` as a dependency;
    /// rejections name the enabled dependents. Disabling a disabled module
    /// is a no-op. No partial state change occurs.
    pub async fn disable_module(&mut self, key: &str) -> Result<()> {
        let module = self.require_module(key).await?;

        if !module.enabled {
            debug!("Module '{}' already disabled", key);
            return Ok(());
        }

        let dependents: Vec<String> = self
            .get_dependents(key)
            .await?
            .into_iter()
            .filter(|dependent| dependent.enabled)
            .map(|dependent| dependent.name().to_string())
            .collect();

        if !dependents.is_empty() {
            return Err(LicensingError::DependentsStillEnabled {
                module: module.name().to_string(),
                dependents,
            });
        }

        self.catalog.set_enabled(key, false).await?;
        self.refresh_cache();
        info!("Disabled module '{}'", key);
        Ok(())
    }

    /// Resolved module list for presentation, ordered by display order.
    pub async fn list_modules(&mut self) -> Result<Vec<ModuleStatus>> {
        let records: Vec<ModuleRecord> = self.snapshot().await?.values().cloned().collect();

        let mut statuses = Vec::with_capacity(records.len());
        for record in &records {
            let licensed = self.license.is_module_licensed(record.key()).await;
            statuses.push(ModuleStatus::from_record(record, licensed));
        }
        statuses.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(statuses)
    }

    // License pass-throughs. Mutations invalidate the module snapshot so
    // licensed-status is re-derived.

    pub async fn license_details(&self) -> Option<LicenseRecord> {
        self.license.license_details().await
    }

    pub async fn validate_license(&mut self, key: &str) -> Result<LicenseRecord> {
        let record = self.license.validate_license(key).await?;
        self.refresh_cache();
        Ok(record)
    }

    pub async fn clear_license_cache(&mut self) {
        self.license.clear_license_cache().await;
        self.refresh_cache();
    }

    pub async fn days_until_expiration(&self) -> i64 {
        self.license.days_until_expiration().await
    }

    pub async fn days_until_support_expiration(&self) -> i64 {
        self.license.days_until_support_expiration().await
    }

    // Catalog pass-throughs.

    pub async fn catalog_stats(&self) -> Result<CatalogStats> {
        self.catalog.stats().await
    }

    pub async fn catalog_health(&self) -> Result<CatalogHealth> {
        self.catalog.health().await
    }

    pub async fn validate_catalog(&self) -> Result<Vec<ValidationIssue>> {
        self.catalog.validate_catalog().await
    }
}
