//! Transport boundary
//!
//! The wire (SOAP, HTTP, encryption, packing) lives behind [`Transport`].
//! Hubs answer with loosely typed values; [`loose_bool`] is the only place
//! that interprets them, so the queue itself only ever sees `bool`.

use serde_json::Value;
use tracing::warn;

use crate::error::CommitResult;
use crate::queue::CommitEvent;

/// Delivers a commit to the remote hub
///
/// `send` blocks until the hub answers or the transport's own timeout
/// expires. `Ok(None)` means the hub returned nothing.
pub trait Transport {
    fn send(&self, event: &CommitEvent) -> CommitResult<Option<Value>>;
}

impl<F> Transport for F
where
    F: Fn(&CommitEvent) -> CommitResult<Option<Value>>,
{
    fn send(&self, event: &CommitEvent) -> CommitResult<Option<Value>> {
        self(event)
    }
}

/// Interpret a hub response: `true`, `"1"` and `1` are success, anything
/// else (including no response) is failure
pub fn loose_bool(response: Option<&Value>) -> bool {
    match response {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim() == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1) || n.as_u64() == Some(1),
        _ => false,
    }
}

/// Send and reduce the outcome to success/failure
pub fn deliver(transport: &dyn Transport, event: &CommitEvent) -> bool {
    match transport.send(event) {
        Ok(response) => loose_bool(response.as_ref()),
        Err(e) => {
            warn!(fingerprint = event.fingerprint(), error = %e, "commit delivery failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommitError;
    use crate::queue::Action;
    use serde_json::json;

    #[test]
    fn test_loose_bool_table() {
        assert!(loose_bool(Some(&json!(true))));
        assert!(loose_bool(Some(&json!("1"))));
        assert!(loose_bool(Some(&json!(1))));

        assert!(!loose_bool(Some(&json!(false))));
        assert!(!loose_bool(Some(&json!("0"))));
        assert!(!loose_bool(Some(&json!(0))));
        assert!(!loose_bool(Some(&json!("yes"))));
        assert!(!loose_bool(Some(&json!({"ok": true}))));
        assert!(!loose_bool(Some(&Value::Null)));
        assert!(!loose_bool(None));
    }

    #[test]
    fn test_deliver_maps_errors_to_failure() {
        let event = CommitEvent::new("hub-1", "contact", 1, Action::Update, "", "").unwrap();

        let ok = |_: &CommitEvent| -> CommitResult<Option<Value>> { Ok(Some(json!("1"))) };
        let down = |e: &CommitEvent| -> CommitResult<Option<Value>> {
            Err(CommitError::TransportFailed {
                fingerprint: e.fingerprint().to_string(),
                reason: "connection refused".to_string(),
            })
        };

        assert!(deliver(&ok, &event));
        assert!(!deliver(&down, &event));
    }
}
