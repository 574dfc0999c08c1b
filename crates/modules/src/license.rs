use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::authority::LicenseAuthority;
use crate::error::{LicensingError, Result};
use crate::models::{CatalogConfig, LicenseRecord};

/// Read side of the licensing subsystem.
///
/// `license_details` and `is_module_licensed` never fail: a broken authority
/// degrades to the last cached record. Only `validate_license` surfaces
/// errors, because the operator explicitly asked for a remote round-trip.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Current license record, revalidated against the authority when the
    /// cached copy is stale. `None` until a key has ever been accepted.
    async fn license_details(&self) -> Option<LicenseRecord>;

    /// Submit a key to the authority. On accept the cached record is
    /// replaced and the key persisted; on reject prior state is untouched.
    async fn validate_license(&self, key: &str) -> Result<LicenseRecord>;

    /// Force the next read to revalidate remotely. Pure cache invalidation,
    /// the stored record is re-fetched rather than deleted.
    async fn clear_license_cache(&self);

    /// Bumped whenever the cached record changes or is invalidated, so that
    /// dependent caches can re-derive licensed-status.
    fn cache_generation(&self) -> u64;

    async fn is_module_licensed(&self, module_key: &str) -> bool {
        match self.license_details().await {
            Some(record) => record.is_active_at(Utc::now()) && record.entitles(module_key),
            None => false,
        }
    }

    /// Whole days until the license expires; 0 when expired or absent.
    async fn days_until_expiration(&self) -> i64 {
        match self.license_details().await {
            Some(record) => record.days_until_expiration_at(Utc::now()),
            None => 0,
        }
    }

    /// Whole days until support expires; 0 when expired or absent.
    async fn days_until_support_expiration(&self) -> i64 {
        match self.license_details().await {
            Some(record) => record.days_until_support_expiration_at(Utc::now()),
            None => 0,
        }
    }
}

/// License keys are opaque strings, 16 to 64 characters, no whitespace.
pub fn validate_license_key(key: &str) -> Result<()> {
    let len = key.chars().count();
    if !(16..=64).contains(&len) {
        return Err(LicensingError::InvalidLicenseKey(
            "key must be between 16 and 64 characters".to_string(),
        ));
    }
    if key.chars().any(|c| c.is_whitespace()) {
        return Err(LicensingError::InvalidLicenseKey(
            "key must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

/// JSON-persisted cache payload (license.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LicenseCacheFile {
    key: Option<String>,
    record: Option<LicenseRecord>,
    fetched_at: Option<DateTime<Utc>>,
    version: String,
}

impl Default for LicenseCacheFile {
    fn default() -> Self {
        Self {
            key: None,
            record: None,
            fetched_at: None,
            version: "1.0".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    file: LicenseCacheFile,
    /// Set by `clear_license_cache`; independent of the TTL so that a failed
    /// forced revalidation does not spuriously mark a fresh record invalid.
    force_revalidate: bool,
}

/// [`LicenseStore`] backed by an external [`LicenseAuthority`] with a
/// TTL-bounded local cache, persisted next to the module catalog.
pub struct CachedLicenseStore {
    authority: Box<dyn LicenseAuthority>,
    config: CatalogConfig,
    cache_path: PathBuf,
    backup_path: PathBuf,
    state: RwLock<CacheState>,
    generation: AtomicU64,
}

impl CachedLicenseStore {
    pub async fn new<P: AsRef<Path>>(
        data_dir: P,
        authority: Box<dyn LicenseAuthority>,
        config: CatalogConfig,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).await?;

        let cache_path = data_dir.join("license.json");
        let backup_path = data_dir.join("license.json.backup");
        let file = Self::load(&cache_path, &backup_path).await?;

        Ok(Self {
            authority,
            config,
            cache_path,
            backup_path,
            state: RwLock::new(CacheState {
                file,
                force_revalidate: false,
            }),
            generation: AtomicU64::new(0),
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    async fn load(cache_path: &Path, backup_path: &Path) -> Result<LicenseCacheFile> {
        if !cache_path.exists() {
            info!("No existing license cache found, starting empty");
            return Ok(LicenseCacheFile::default());
        }

        match fs::read_to_string(cache_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| LicensingError::CorruptedLicenseCache(e.to_string())),
            Err(_) => {
                warn!("Failed to read license cache, checking backup");
                if backup_path.exists() {
                    let backup_content = fs::read_to_string(backup_path).await?;
                    serde_json::from_str(&backup_content)
                        .map_err(|e| LicensingError::CorruptedLicenseCache(e.to_string()))
                } else {
                    Ok(LicenseCacheFile::default())
                }
            }
        }
    }

    /// Save the cache file with an atomic backup of the previous copy.
    async fn save(&self, file: &LicenseCacheFile) -> Result<()> {
        let content = serde_json::to_string_pretty(file).map_err(|e| {
            LicensingError::PersistenceFailure {
                operation: "serialize license cache".to_string(),
                source: Box::new(e),
            }
        })?;

        if self.cache_path.exists() {
            if let Err(e) = fs::copy(&self.cache_path, &self.backup_path).await {
                warn!("Failed to back up license cache: {}", e);
            }
        }

        fs::write(&self.cache_path, content).await.map_err(|e| {
            LicensingError::PersistenceFailure {
                operation: "write license cache".to_string(),
                source: Box::new(e),
            }
        })?;
        debug!("License cache saved");
        Ok(())
    }

    fn is_fresh(file: &LicenseCacheFile, config: &CatalogConfig, now: DateTime<Utc>) -> bool {
        match (&file.record, file.fetched_at) {
            (Some(_), Some(fetched_at)) => now
                .signed_duration_since(fetched_at)
                .to_std()
                .map(|age| age < config.license_ttl)
                .unwrap_or(true),
            _ => false,
        }
    }

    async fn call_authority(&self, key: &str) -> Result<LicenseRecord> {
        match tokio::time::timeout(self.config.authority_timeout, self.authority.validate(key))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LicensingError::Timeout),
        }
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LicenseStore for CachedLicenseStore {
    async fn license_details(&self) -> Option<LicenseRecord> {
        let now = Utc::now();
        {
            let state = self.state.read().await;
            if !state.force_revalidate && Self::is_fresh(&state.file, &self.config, now) {
                return state.file.record.clone();
            }
        }

        let mut state = self.state.write().await;
        // Re-check after the lock switch so concurrent readers trigger at
        // most one authority call.
        if !state.force_revalidate && Self::is_fresh(&state.file, &self.config, now) {
            return state.file.record.clone();
        }

        let Some(key) = state.file.key.clone() else {
            return state.file.record.clone();
        };

        match self.call_authority(&key).await {
            Ok(record) => {
                debug!("License revalidated with authority '{}'", self.authority.name());
                state.file.record = Some(record.clone());
                state.file.fetched_at = Some(Utc::now());
                state.force_revalidate = false;
                if let Err(e) = self.save(&state.file).await {
                    warn!("Failed to persist refreshed license cache: {}", e);
                }
                self.bump_generation();
                Some(record)
            }
            Err(e) => {
                warn!("License revalidation failed, serving cached record: {}", e);
                state.force_revalidate = false;
                let ttl_elapsed = !Self::is_fresh(&state.file, &self.config, now);
                state.file.record.clone().map(|mut record| {
                    if ttl_elapsed {
                        record.valid = false;
                    }
                    record
                })
            }
        }
    }

    async fn validate_license(&self, key: &str) -> Result<LicenseRecord> {
        validate_license_key(key)?;

        // A rejection or transport failure leaves prior state untouched.
        let record = self.call_authority(key).await?;

        let mut state = self.state.write().await;
        state.file.key = Some(key.to_string());
        state.file.record = Some(record.clone());
        state.file.fetched_at = Some(Utc::now());
        state.force_revalidate = false;
        self.save(&state.file).await?;
        self.bump_generation();

        info!(
            "License accepted for customer '{}', {} entitled modules",
            record.customer_name,
            record.entitlements.len()
        );
        Ok(record)
    }

    async fn clear_license_cache(&self) {
        let mut state = self.state.write().await;
        state.force_revalidate = true;
        self.bump_generation();
        debug!("License cache cleared, next read will revalidate");
    }

    fn cache_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::StaticAuthority;
    use crate::models::SeatLimits;
    use chrono::Duration as ChronoDuration;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const KEY: &str = "CAMPUS-1234-5678-9ABC";

    fn record(modules: &[&str], expires_in_days: i64) -> LicenseRecord {
        let now = Utc::now();
        LicenseRecord {
            key: KEY.to_string(),
            customer_name: "Hillcrest Academy".to_string(),
            customer_email: "it@hillcrest.example".to_string(),
            valid: true,
            expires_at: now + ChronoDuration::days(expires_in_days),
            support_expires_at: now + ChronoDuration::days(expires_in_days / 2),
            entitlements: modules.iter().map(|m| m.to_string()).collect(),
            seats: SeatLimits::default(),
        }
    }

    /// Counts authority calls and optionally fails them.
    struct CountingAuthority {
        inner: StaticAuthority,
        calls: Arc<AtomicUsize>,
        fail: Arc<std::sync::atomic::AtomicBool>,
    }

    impl CountingAuthority {
        fn new(rec: LicenseRecord) -> (Self, Arc<AtomicUsize>, Arc<std::sync::atomic::AtomicBool>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
            (
                Self {
                    inner: StaticAuthority::new().with_record(rec),
                    calls: calls.clone(),
                    fail: fail.clone(),
                },
                calls,
                fail,
            )
        }
    }

    #[async_trait]
    impl LicenseAuthority for CountingAuthority {
        async fn validate(&self, key: &str) -> Result<LicenseRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(LicensingError::AuthorityUnavailable(
                    "simulated outage".to_string(),
                ));
            }
            self.inner.validate(key).await
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    async fn store_with(
        dir: &TempDir,
        authority: Box<dyn LicenseAuthority>,
        ttl: Duration,
    ) -> CachedLicenseStore {
        let config = CatalogConfig {
            license_ttl: ttl,
            authority_timeout: Duration::from_secs(5),
        };
        CachedLicenseStore::new(dir.path(), authority, config)
            .await
            .unwrap()
    }

    #[test]
    fn key_format_is_enforced() {
        assert!(validate_license_key(KEY).is_ok());
        assert!(validate_license_key("short").is_err());
        assert!(validate_license_key(&"x".repeat(65)).is_err());
        assert!(validate_license_key("CAMPUS 1234 5678 9ABC").is_err());
    }

    #[tokio::test]
    async fn entitlements_gate_module_licensing() {
        let dir = TempDir::new().unwrap();
        let (authority, _, _) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;

        store.validate_license(KEY).await.unwrap();
        assert!(store.is_module_licensed("library").await);
        assert!(!store.is_module_licensed("fee_management").await);
    }

    #[tokio::test]
    async fn fresh_cache_avoids_authority_calls() {
        let dir = TempDir::new().unwrap();
        let (authority, calls, _) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;

        store.validate_license(KEY).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.is_module_licensed("library").await;
        store.is_module_licensed("library").await;
        store.license_details().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_cache_triggers_exactly_one_revalidation() {
        let dir = TempDir::new().unwrap();
        let (authority, calls, _) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;

        store.validate_license(KEY).await.unwrap();
        store.clear_license_cache().await;
        assert!(store.is_module_licensed("library").await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Subsequent reads are served from the refreshed cache.
        assert!(store.is_module_licensed("library").await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn authority_outage_serves_last_known_record_while_fresh() {
        let dir = TempDir::new().unwrap();
        let (authority, _, fail) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;

        store.validate_license(KEY).await.unwrap();
        fail.store(true, Ordering::SeqCst);

        // Forced revalidation fails but the TTL has not elapsed: the cached
        // record is served unchanged.
        store.clear_license_cache().await;
        assert!(store.is_module_licensed("library").await);
    }

    #[tokio::test]
    async fn authority_outage_after_ttl_marks_record_invalid() {
        let dir = TempDir::new().unwrap();
        let (authority, _, fail) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(0)).await;

        store.validate_license(KEY).await.unwrap();
        fail.store(true, Ordering::SeqCst);

        let details = store.license_details().await.unwrap();
        assert!(!details.valid);
        assert!(!store.is_module_licensed("library").await);
    }

    #[tokio::test]
    async fn rejection_leaves_prior_state_untouched() {
        let dir = TempDir::new().unwrap();
        let (authority, _, _) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;

        store.validate_license(KEY).await.unwrap();

        let err = store
            .validate_license("CAMPUS-UNKNOWN-KEY-0000")
            .await
            .unwrap_err();
        assert!(matches!(err, LicensingError::LicenseValidationFailed(_)));

        // Old key and record still in place.
        let details = store.license_details().await.unwrap();
        assert_eq!(details.key, KEY);
        assert!(store.is_module_licensed("library").await);
    }

    #[tokio::test]
    async fn expiration_day_counts_never_negative() {
        let dir = TempDir::new().unwrap();
        let (authority, _, _) = CountingAuthority::new(record(&["library"], 30));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;

        assert_eq!(store.days_until_expiration().await, 0); // no record yet

        store.validate_license(KEY).await.unwrap();
        let days = store.days_until_expiration().await;
        assert!(days == 29 || days == 30);
        assert!(store.days_until_support_expiration().await >= 0);
    }

    #[tokio::test]
    async fn cache_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let (authority, _, _) = CountingAuthority::new(record(&["library"], 365));
            let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;
            store.validate_license(KEY).await.unwrap();
            assert_eq!(store.cache_path(), dir.path().join("license.json"));
            assert!(store.cache_path().exists());
        }

        // New instance, authority never called: served from disk.
        let (authority, calls, _) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;
        assert!(store.is_module_licensed("library").await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generation_bumps_on_cache_changes() {
        let dir = TempDir::new().unwrap();
        let (authority, _, _) = CountingAuthority::new(record(&["library"], 365));
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;

        let g0 = store.cache_generation();
        store.validate_license(KEY).await.unwrap();
        let g1 = store.cache_generation();
        assert!(g1 > g0);

        store.clear_license_cache().await;
        assert!(store.cache_generation() > g1);
    }

    #[tokio::test]
    async fn entitlement_sets_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let rec = record(&["library", "attendance"], 365);
        let expected: BTreeSet<String> = rec.entitlements.clone();
        {
            let (authority, _, _) = CountingAuthority::new(rec);
            let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;
            store.validate_license(KEY).await.unwrap();
        }

        let authority = StaticAuthority::new();
        let store = store_with(&dir, Box::new(authority), Duration::from_secs(3600)).await;
        let details = store.license_details().await.unwrap();
        assert_eq!(details.entitlements, expected);
    }
}
