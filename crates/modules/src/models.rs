use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static description of an optional feature module, as declared in the
/// shipped configuration. Immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub key: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub order: i32,
    /// Direct dependencies only, by module key.
    pub dependencies: Vec<String>,
}

impl ModuleDescriptor {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            description: String::new(),
            icon: String::new(),
            order: 0,
            dependencies: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn depends_on(&self, key: &str) -> bool {
        self.dependencies.iter().any(|dep| dep == key)
    }
}

/// A catalog row: the descriptor plus its persisted toggle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub descriptor: ModuleDescriptor,
    pub enabled: bool,
    pub seeded_at: DateTime<Utc>,
    pub last_toggled: Option<DateTime<Utc>>,
}

impl ModuleRecord {
    pub fn from_descriptor(descriptor: ModuleDescriptor) -> Self {
        Self {
            descriptor,
            enabled: false,
            seeded_at: Utc::now(),
            last_toggled: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.descriptor.dependencies
    }

    pub fn mark_toggled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.last_toggled = Some(Utc::now());
    }
}

/// Resolved view of a module for presentation: toggle state plus whether the
/// current license covers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub key: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub order: i32,
    pub dependencies: Vec<String>,
    pub enabled: bool,
    pub licensed: bool,
}

impl ModuleStatus {
    pub fn from_record(record: &ModuleRecord, licensed: bool) -> Self {
        Self {
            key: record.descriptor.key.clone(),
            name: record.descriptor.name.clone(),
            description: record.descriptor.description.clone(),
            icon: record.descriptor.icon.clone(),
            order: record.descriptor.order,
            dependencies: record.descriptor.dependencies.clone(),
            enabled: record.enabled,
            licensed,
        }
    }
}

/// Seat limits granted by a license. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatLimits {
    pub max_students: Option<u32>,
    pub max_teachers: Option<u32>,
    pub max_employees: Option<u32>,
}

/// A validated license as returned by the external authority and cached
/// locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub key: String,
    pub customer_name: String,
    pub customer_email: String,
    pub valid: bool,
    pub expires_at: DateTime<Utc>,
    pub support_expires_at: DateTime<Utc>,
    pub entitlements: BTreeSet<String>,
    pub seats: SeatLimits,
}

impl LicenseRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Valid flag and expiry combined: the record actually grants anything.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid && !self.is_expired_at(now)
    }

    pub fn entitles(&self, module_key: &str) -> bool {
        self.entitlements.contains(module_key)
    }

    pub fn days_until_expiration_at(&self, now: DateTime<Utc>) -> i64 {
        days_until(self.expires_at, now)
    }

    pub fn days_until_support_expiration_at(&self, now: DateTime<Utc>) -> i64 {
        days_until(self.support_expires_at, now)
    }
}

/// Whole days remaining until `expiry`, clamped at zero.
pub(crate) fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_days().max(0)
}

/// Tunables injected into the stores. No process-wide state.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// How long a cached license record counts as fresh.
    pub license_ttl: Duration,
    /// Upper bound on a single authority call.
    pub authority_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            license_ttl: Duration::from_secs(12 * 60 * 60),
            authority_timeout: Duration::from_secs(10),
        }
    }
}

/// Statistics about the module catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_modules: usize,
    pub enabled_modules: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Catalog health information (generic across implementations)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogHealth {
    pub healthy: bool,
    pub total_modules: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub implementation_info: HashMap<String, serde_json::Value>,
}

impl CatalogHealth {
    pub fn healthy(total_modules: usize) -> Self {
        Self {
            healthy: true,
            total_modules,
            last_updated: Some(Utc::now()),
            implementation_info: HashMap::new(),
        }
    }

}

/// Issue found while validating catalog consistency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub module_key: String,
    pub issue_type: ValidationIssueType,
    pub description: String,
    pub severity: IssueSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssueType {
    UnknownDependency,
    SelfDependency,
    InconsistentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    Critical,
}
