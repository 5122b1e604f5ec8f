//! ERP client trait and configuration
//!
//! The `ErpClient` trait is the seam between the sync engine and the ERP's
//! RPC protocol. The production implementation is [`crate::rpc::JsonRpcClient`];
//! tests substitute their own implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use labsync_core::ExternalId;

use crate::error::{ErpError, ErpResult};
use crate::filter::Filter;
use crate::record::{FieldValues, PageRequest, RecordPage};

/// Default request timeout, independent of retry backoff.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default page size for search pagination.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// An authenticated ERP session.
///
/// Opaque to callers; the gateway caches it for the duration of a run and
/// re-authenticates once if the ERP rejects it mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw session value (a numeric uid for the JSON-RPC protocol).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw session value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Connection settings for the ERP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpConfig {
    /// Base URL of the ERP's RPC endpoint, e.g. `https://erp.example.com`.
    pub base_url: String,
    /// Name of the ERP database to authenticate against.
    pub database: String,
    /// Login username.
    pub username: String,
    /// API key or password.
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Page size used when paginating searches.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl ErpConfig {
    /// Validate the configuration before building a client from it.
    pub fn validate(&self) -> ErpResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ErpError::InvalidConfiguration {
                message: format!("base_url must be http(s), got '{}'", self.base_url),
            });
        }
        if self.database.is_empty() {
            return Err(ErpError::InvalidConfiguration {
                message: "database must not be empty".to_string(),
            });
        }
        if self.username.is_empty() {
            return Err(ErpError::InvalidConfiguration {
                message: "username must not be empty".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(ErpError::InvalidConfiguration {
                message: "page_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Copy with credentials blanked, safe for logging.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            api_key: "***".to_string(),
            ..self.clone()
        }
    }
}

/// Low-level ERP RPC client.
///
/// One method per wire operation; no retry, session caching, or pagination
/// here — that is the gateway's job. Implementations must not reorder
/// records within a page.
#[async_trait]
pub trait ErpClient: Send + Sync {
    /// Authenticate and return a session token.
    ///
    /// Fails with [`ErpError::AuthenticationFailed`] on bad credentials.
    async fn authenticate(&self) -> ErpResult<SessionToken>;

    /// Verify that the execution RPC this adapter depends on exists.
    ///
    /// Called once at engine startup; a missing capability is a fatal
    /// configuration error, not something to work around at runtime.
    async fn probe(&self, session: &SessionToken) -> ErpResult<()>;

    /// Fetch one page of records matching `filter`.
    async fn search(
        &self,
        session: &SessionToken,
        model: &str,
        filter: &Filter,
        fields: &[&str],
        page: PageRequest,
    ) -> ErpResult<RecordPage>;

    /// Create a record, returning its new external id.
    async fn create(
        &self,
        session: &SessionToken,
        model: &str,
        fields: &FieldValues,
    ) -> ErpResult<ExternalId>;

    /// Update an existing record.
    async fn update(
        &self,
        session: &SessionToken,
        model: &str,
        id: &ExternalId,
        fields: &FieldValues,
    ) -> ErpResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ErpConfig {
        ErpConfig {
            base_url: "https://erp.example.com".to_string(),
            database: "lab".to_string(),
            username: "sync".to_string(),
            api_key: "secret".to_string(),
            timeout_secs: 30,
            page_size: 100,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let cfg = ErpConfig {
            base_url: "ftp://erp".to_string(),
            ..config()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ErpError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_database() {
        let cfg = ErpConfig {
            database: String::new(),
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let cfg = ErpConfig {
            page_size: 0,
            ..config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_api_key() {
        let cfg = config().redacted();
        assert_eq!(cfg.api_key, "***");
        assert_eq!(cfg.username, "sync");
    }
}
