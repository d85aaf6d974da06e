//! Input Validation Module
//!
//! Checks applied to host-supplied names before they reach the queue or the
//! fingerprint. Object ids are opaque to this crate, so id validation only
//! rejects values that cannot round-trip through logs and stores.
//!
//! ## Usage
//!
//! ```rust
//! use hub_commit::validation::{validate_object_type, validate_object_id};
//!
//! validate_object_type("contact").unwrap();
//! validate_object_id("42", "contact").unwrap();
//! ```

use crate::codec::{ID_SEP, LIST_SEP};
use crate::error::{CommitError, CommitResult};

/// Longest object type name accepted
pub const MAX_OBJECT_TYPE_LEN: usize = 64;

/// Longest single object id accepted
pub const MAX_OBJECT_ID_LEN: usize = 255;

/// Validate an object type name.
///
/// Allows: alphanumeric, underscore, dash, dot.
/// Rejects: empty names, codec separators, whitespace, anything longer than
/// [`MAX_OBJECT_TYPE_LEN`].
pub fn validate_object_type(object_type: &str) -> CommitResult<()> {
    if object_type.is_empty() {
        return Err(CommitError::InvalidInput {
            parameter: "object_type".to_string(),
            value: String::new(),
            reason: "Object type cannot be empty".to_string(),
        });
    }

    if object_type.contains(LIST_SEP) || object_type.contains(ID_SEP) {
        return Err(CommitError::InvalidInput {
            parameter: "object_type".to_string(),
            value: sanitize_for_logging(object_type),
            reason: "Object type cannot contain identifier separators".to_string(),
        });
    }

    if !object_type.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return Err(CommitError::InvalidInput {
            parameter: "object_type".to_string(),
            value: sanitize_for_logging(object_type),
            reason: "Object type must contain only alphanumeric characters, '_', '-' or '.'".to_string(),
        });
    }

    if object_type.len() > MAX_OBJECT_TYPE_LEN {
        return Err(CommitError::InvalidInput {
            parameter: "object_type".to_string(),
            value: sanitize_for_logging(object_type),
            reason: format!("Object type too long (max {MAX_OBJECT_TYPE_LEN} characters)"),
        });
    }

    Ok(())
}

/// Validate a single normalized object id
pub fn validate_object_id(object_id: &str, object_type: &str) -> CommitResult<()> {
    if object_id.trim().is_empty() {
        return Err(CommitError::InvalidObjectIds {
            object_type: object_type.to_string(),
            reason: "Object id cannot be blank".to_string(),
        });
    }

    if object_id.chars().any(char::is_control) {
        return Err(CommitError::InvalidObjectIds {
            object_type: object_type.to_string(),
            reason: format!("Object id '{}' contains control characters", sanitize_for_logging(object_id)),
        });
    }

    if object_id.len() > MAX_OBJECT_ID_LEN {
        return Err(CommitError::InvalidObjectIds {
            object_type: object_type.to_string(),
            reason: format!("Object id too long (max {MAX_OBJECT_ID_LEN} characters)"),
        });
    }

    Ok(())
}

/// Truncate and escape a value before it goes into an error or a log line
pub fn sanitize_for_logging(s: &str) -> String {
    let max_chars = 50;
    let truncated: String = if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    };

    truncated
        .replace('\0', "\\0")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
