use serde::{Deserialize, Serialize};
use crate::error::{CommitError, CommitResult};

/// Consecutive delivery failures tolerated before an event becomes obsolete
pub const MAX_FAILURES: u32 = 5;

/// First backoff step; each further failure doubles it
pub const BACKOFF_BASE_SECS: i64 = 60;

/// Attempts at an optimistic store write before giving up with `StoreConflict`
pub const STORE_CAS_RETRIES: usize = 8;

/// Encoding used by file-backed stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFormat {
    /// Human-readable, easiest to inspect by hand
    #[default]
    Json,
    /// Compact bincode encoding
    Binary,
    /// Gzip-compressed JSON
    CompressedJson,
}

/// Immutable settings threaded through constructors.
///
/// Loading them (files, env, host settings tables) belongs to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Defer commits to the waiting queue instead of sending immediately
    pub ws_post_commit: bool,
    /// Bypass every lock check
    pub force_commit: bool,
    /// Identifies the remote hub tenant; part of every fingerprint
    pub tenant_identity: String,
    /// Encoding for file-backed stores
    pub store_format: StoreFormat,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            ws_post_commit: false,
            force_commit: false,
            tenant_identity: "default".to_string(),
            store_format: StoreFormat::Json,
        }
    }
}

impl Configuration {
    pub fn new(tenant_identity: impl Into<String>) -> Self {
        Self {
            tenant_identity: tenant_identity.into(),
            ..Self::default()
        }
    }

    pub fn with_post_commit(mut self, enabled: bool) -> Self {
        self.ws_post_commit = enabled;
        self
    }

    pub fn with_force_commit(mut self, enabled: bool) -> Self {
        self.force_commit = enabled;
        self
    }

    pub fn with_store_format(mut self, format: StoreFormat) -> Self {
        self.store_format = format;
        self
    }

    /// Reject settings the core cannot work with
    pub fn validate(&self) -> CommitResult<()> {
        if self.tenant_identity.trim().is_empty() {
            return Err(CommitError::ConfigError {
                setting: "tenant_identity".to_string(),
                value: self.tenant_identity.clone(),
                reason: "tenant identity cannot be blank".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_code;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();
        assert!(!config.ws_post_commit);
        assert!(!config.force_commit);
        assert_eq!(config.store_format, StoreFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_tenant_rejected() {
        assert_error_code(Configuration::new("  ").validate(), "X001");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Configuration =
            serde_json::from_str(r#"{"tenant_identity":"hub-eu","ws_post_commit":true}"#).unwrap();
        assert!(config.ws_post_commit);
        assert!(!config.force_commit);
        assert_eq!(config.tenant_identity, "hub-eu");
    }
}
