
use std::fmt;

pub mod testing;

/// Main error type for the commit core
#[derive(Debug, Clone, PartialEq)]
pub enum CommitError {
    // ============ Validation Errors (V0xx) ============
    /// Object type not known to the host's object registry
    UnknownObjectType {
        object_type: String,
    },

    /// Id argument could not be normalized into a non-empty id list
    InvalidObjectIds {
        object_type: String,
        reason: String,
    },

    /// Generic input validation failure
    InvalidInput {
        parameter: String,
        value: String,
        reason: String,
    },

    // ============ Store Errors (S0xx) ============
    /// Durable store could not be read or written
    StoreUnavailable {
        store: String,
        reason: String,
    },

    /// Optimistic write lost against a concurrent writer
    StoreConflict {
        expected_version: u64,
        found_version: u64,
    },

    /// Serialization/deserialization failed
    SerializationError {
        message: String,
    },

    // ============ Delivery Errors (T0xx) ============
    /// Transport could not deliver the event
    TransportFailed {
        fingerprint: String,
        reason: String,
    },

    // ============ System Errors (X0xx) ============
    /// Configuration error (invalid setting values)
    ConfigError {
        setting: String,
        value: String,
        reason: String,
    },

    /// Internal error (bug in the crate)
    InternalError {
        message: String,
        file: &'static str,
        line: u32,
    },
}

impl CommitError {
    /// Stable short code for this error, suitable for host-side logs
    pub fn code(&self) -> &'static str {
        use CommitError::*;
        match self {
            UnknownObjectType { .. } => "V001",
            InvalidObjectIds { .. } => "V002",
            InvalidInput { .. } => "V003",

            StoreUnavailable { .. } => "S001",
            StoreConflict { .. } => "S002",
            SerializationError { .. } => "S003",

            TransportFailed { .. } => "T001",

            ConfigError { .. } => "X001",
            InternalError { .. } => "X000",
        }
    }

    /// Whether retrying the same operation can succeed without caller changes
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CommitError::StoreConflict { .. }
                | CommitError::StoreUnavailable { .. }
                | CommitError::TransportFailed { .. }
        )
    }

    /// Create internal error with file/line info
    pub fn internal(message: String, file: &'static str, line: u32) -> Self {
        CommitError::InternalError { message, file, line }
    }
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CommitError::*;
        match self {
            UnknownObjectType { object_type } => {
                write!(f, "Unknown object type '{}'", object_type)
            }
            InvalidObjectIds { object_type, reason } => {
                write!(f, "Invalid object ids for '{}': {}", object_type, reason)
            }
            InvalidInput { parameter, value, reason } => {
                write!(f, "Invalid input for '{}': {} (value: {})", parameter, reason, value)
            }
            StoreUnavailable { store, reason } => {
                write!(f, "Store '{}' unavailable: {}", store, reason)
            }
            StoreConflict { expected_version, found_version } => {
                write!(f, "Store write conflict: expected version {}, found {}",
                       expected_version, found_version)
            }
            SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            TransportFailed { fingerprint, reason } => {
                write!(f, "Transport failed for commit {}: {}", fingerprint, reason)
            }
            ConfigError { setting, value, reason } => {
                write!(f, "Configuration error for '{}': {} (value: {})", setting, reason, value)
            }
            InternalError { message, file, line } => {
                write!(f, "Internal error at {}:{}: {}\nPlease report this bug.",
                       file, line, message)
            }
        }
    }
}

impl std::error::Error for CommitError {}

/// Result type for commit operations
pub type CommitResult<T> = Result<T, CommitError>;

/// Convert serde_json::Error to CommitError
impl From<serde_json::Error> for CommitError {
    fn from(e: serde_json::Error) -> Self {
        CommitError::SerializationError {
            message: format!("JSON serialization error: {}", e),
        }
    }
}

/// Convert bincode::Error to CommitError
impl From<bincode::Error> for CommitError {
    fn from(e: bincode::Error) -> Self {
        CommitError::SerializationError {
            message: format!("Binary serialization error: {}", e),
        }
    }
}

/// Convert std::io::Error to CommitError
impl From<std::io::Error> for CommitError {
    fn from(e: std::io::Error) -> Self {
        CommitError::StoreUnavailable {
            store: "io".to_string(),
            reason: e.to_string(),
        }
    }
}

/// Helper macro for creating internal errors with automatic file/line
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::CommitError::internal($msg.to_string(), file!(), line!())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::CommitError::internal(format!($fmt, $($arg)*), file!(), line!())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_object_type_message() {
        let err = CommitError::UnknownObjectType {
            object_type: "invoice".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("invoice"));
        assert!(msg.contains("Unknown"));
        assert_eq!(err.code(), "V001");
    }

    #[test]
    fn test_store_conflict_message() {
        let err = CommitError::StoreConflict { expected_version: 3, found_version: 4 };

        let msg = err.to_string();
        assert!(msg.contains("expected version 3"));
        assert!(msg.contains("found 4"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_internal_error_macro() {
        let err = internal_error!("Test error at {}", "location");

        match err {
            CommitError::InternalError { message, file, line } => {
                assert!(message.contains("Test error"));
                assert!(file.ends_with("mod.rs"));
                assert!(line > 0);
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_validation_errors_are_not_transient() {
        let err = CommitError::InvalidObjectIds {
            object_type: "contact".to_string(),
            reason: "empty".to_string(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_all_error_codes_unique() {
        let errors = vec![
            CommitError::UnknownObjectType { object_type: "test".to_string() },
            CommitError::InvalidObjectIds { object_type: "test".to_string(), reason: "test".to_string() },
            CommitError::InvalidInput { parameter: "test".to_string(), value: "test".to_string(), reason: "test".to_string() },
            CommitError::StoreUnavailable { store: "test".to_string(), reason: "test".to_string() },
            CommitError::StoreConflict { expected_version: 1, found_version: 2 },
            CommitError::SerializationError { message: "test".to_string() },
            CommitError::TransportFailed { fingerprint: "test".to_string(), reason: "test".to_string() },
            CommitError::ConfigError { setting: "test".to_string(), value: "test".to_string(), reason: "test".to_string() },
            CommitError::InternalError { message: "test".to_string(), file: "test", line: 1 },
        ];

        let codes: std::collections::HashSet<&str> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
