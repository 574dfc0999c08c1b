use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LicensingError, Result};
use crate::models::{LicenseRecord, SeatLimits};

/// External license authority a key is submitted to for validation.
///
/// Implementations are remote services; callers are expected to bound each
/// call with a timeout and fall back to cached state on failure.
#[async_trait]
pub trait LicenseAuthority: Send + Sync {
    /// Submit a key for validation. A rejection (key unknown, revoked,
    /// malformed on the server side) is `LicenseValidationFailed`; transport
    /// problems are `AuthorityUnavailable`.
    async fn validate(&self, key: &str) -> Result<LicenseRecord>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Wire payload returned by the license authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityResponse {
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    pub expires_at: DateTime<Utc>,
    pub support_expires_at: DateTime<Utc>,
    #[serde(default)]
    pub entitled_modules: Vec<String>,
    #[serde(default)]
    pub max_students: Option<u32>,
    #[serde(default)]
    pub max_teachers: Option<u32>,
    #[serde(default)]
    pub max_employees: Option<u32>,
}

impl AuthorityResponse {
    pub fn into_record(self, key: &str) -> LicenseRecord {
        LicenseRecord {
            key: key.to_string(),
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            valid: self.valid,
            expires_at: self.expires_at,
            support_expires_at: self.support_expires_at,
            entitlements: BTreeSet::from_iter(self.entitled_modules),
            seats: SeatLimits {
                max_students: self.max_students,
                max_teachers: self.max_teachers,
                max_employees: self.max_employees,
            },
        }
    }
}

/// In-memory authority backed by a fixed key table. Used for offline
/// deployments, development, and tests.
#[derive(Debug, Default)]
pub struct StaticAuthority {
    records: HashMap<String, LicenseRecord>,
}

impl StaticAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: LicenseRecord) -> Self {
        self.records.insert(record.key.clone(), record);
        self
    }

    pub fn insert(&mut self, record: LicenseRecord) {
        self.records.insert(record.key.clone(), record);
    }
}

#[async_trait]
impl LicenseAuthority for StaticAuthority {
    async fn validate(&self, key: &str) -> Result<LicenseRecord> {
        self.records.get(key).cloned().ok_or_else(|| {
            LicensingError::LicenseValidationFailed(
                "license key is not known to the authority".to_string(),
            )
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// HTTP license authority: POSTs the key as JSON and expects an
/// [`AuthorityResponse`] body.
#[cfg(feature = "http")]
pub struct HttpLicenseAuthority {
    endpoint: url::Url,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpLicenseAuthority {
    pub fn new(endpoint: url::Url) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl LicenseAuthority for HttpLicenseAuthority {
    async fn validate(&self, key: &str) -> Result<LicenseRecord> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "key": key }))
            .send()
            .await
            .map_err(|e| LicensingError::AuthorityUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LicensingError::AuthorityUnavailable(format!(
                "authority returned HTTP {}",
                status
            )));
        }

        let body: AuthorityResponse = response
            .json()
            .await
            .map_err(|e| LicensingError::AuthorityUnavailable(e.to_string()))?;

        if !body.valid {
            let reason = body
                .message
                .clone()
                .unwrap_or_else(|| "license rejected by authority".to_string());
            return Err(LicensingError::LicenseValidationFailed(reason));
        }

        Ok(body.into_record(key))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn test_record(key: &str, modules: &[&str]) -> LicenseRecord {
        let now = Utc::now();
        LicenseRecord {
            key: key.to_string(),
            customer_name: "Hillcrest Academy".to_string(),
            customer_email: "it@hillcrest.example".to_string(),
            valid: true,
            expires_at: now + ChronoDuration::days(365),
            support_expires_at: now + ChronoDuration::days(180),
            entitlements: modules.iter().map(|m| m.to_string()).collect(),
            seats: SeatLimits::default(),
        }
    }

    #[tokio::test]
    async fn static_authority_accepts_known_key() {
        let authority =
            StaticAuthority::new().with_record(test_record("CAMPUS-1234-5678-9ABC", &["library"]));

        let record = authority.validate("CAMPUS-1234-5678-9ABC").await.unwrap();
        assert!(record.entitles("library"));
        assert!(!record.entitles("fee_management"));
    }

    #[tokio::test]
    async fn static_authority_rejects_unknown_key() {
        let authority = StaticAuthority::new();
        let err = authority.validate("CAMPUS-0000-0000-0000").await.unwrap_err();
        assert!(matches!(err, LicensingError::LicenseValidationFailed(_)));
    }

    #[test]
    fn authority_response_maps_to_record() {
        let now = Utc::now();
        let response = AuthorityResponse {
            valid: true,
            message: None,
            customer_name: "Hillcrest Academy".to_string(),
            customer_email: "it@hillcrest.example".to_string(),
            expires_at: now + ChronoDuration::days(30),
            support_expires_at: now + ChronoDuration::days(15),
            entitled_modules: vec!["library".to_string(), "attendance".to_string()],
            max_students: Some(1200),
            max_teachers: None,
            max_employees: None,
        };

        let record = response.into_record("CAMPUS-1234-5678-9ABC");
        assert_eq!(record.key, "CAMPUS-1234-5678-9ABC");
        assert!(record.entitles("attendance"));
        assert_eq!(record.seats.max_students, Some(1200));
        assert_eq!(record.seats.max_teachers, None);
    }
}
