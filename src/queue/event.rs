use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ids::{normalize_object_ids, ObjectIds};
use super::lock::LockRegistry;
use crate::config::{BACKOFF_BASE_SECS, MAX_FAILURES};
use crate::error::{CommitError, CommitResult};

/// What happened to the objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CommitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            _ => Err(CommitError::InvalidInput {
                parameter: "action".to_string(),
                value: crate::validation::sanitize_for_logging(s),
                reason: "Expected one of create, update, delete".to_string(),
            }),
        }
    }
}

/// Position in the delivery retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Eligible for delivery now
    Ready,
    /// Waiting until `retry_at`
    Backoff,
    /// Retry budget exhausted; never delivered
    Obsolete,
}

/// Payload handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStruct {
    #[serde(rename = "type")]
    pub object_type: String,
    pub action: Action,
    pub id: Vec<String>,
    pub user: String,
    pub comment: String,
}

/// "Objects `object_ids` of type `object_type` underwent `action`"
///
/// Identity fields are fixed at construction; only the retry state
/// (`failure_count`, `retry_at`) changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    object_type: String,
    object_ids: Vec<String>,
    action: Action,
    user: String,
    comment: String,
    tenant_identity: String,
    fingerprint: String,
    failure_count: u32,
    retry_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CommitEvent {
    pub fn new(
        tenant_identity: &str,
        object_type: &str,
        ids: impl Into<ObjectIds>,
        action: Action,
        user: &str,
        comment: &str,
    ) -> CommitResult<Self> {
        let object_ids = normalize_object_ids(object_type, ids)?;
        let fingerprint = fingerprint(object_type, &object_ids, action, tenant_identity)?;

        Ok(Self {
            object_type: object_type.to_string(),
            object_ids,
            action,
            user: user.to_string(),
            comment: comment.to_string(),
            tenant_identity: tenant_identity.to_string(),
            fingerprint,
            failure_count: 0,
            retry_at: None,
            created_at: Utc::now(),
        })
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn object_ids(&self) -> &[String] {
        &self.object_ids
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn tenant_identity(&self) -> &str {
        &self.tenant_identity
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        self.retry_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn to_struct(&self) -> CommitStruct {
        CommitStruct {
            object_type: self.object_type.clone(),
            action: self.action,
            id: self.object_ids.clone(),
            user: self.user.clone(),
            comment: self.comment.clone(),
        }
    }

    /// Human-readable one-liner for logs and admin screens
    pub fn description(&self) -> String {
        let mut description = format!(
            "{} {} [{}] by {}",
            self.action,
            self.object_type,
            self.object_ids.join(", "),
            if self.user.is_empty() { "unknown" } else { self.user.as_str() },
        );
        if !self.comment.is_empty() {
            description.push_str(&format!(" ({})", self.comment));
        }
        description
    }

    pub fn is_allowed(&self, locks: &LockRegistry) -> bool {
        locks.is_allowed(&self.object_type, &self.object_ids, self.action)
    }

    // ============ Retry state machine ============

    pub fn is_obsolete(&self) -> bool {
        self.failure_count > MAX_FAILURES
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Utc::now())
    }

    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_obsolete() {
            return false;
        }
        match self.retry_at {
            None => true,
            Some(retry_at) => now >= retry_at,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state_at(Utc::now())
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> RetryState {
        if self.is_obsolete() {
            RetryState::Obsolete
        } else if self.is_ready_at(now) {
            RetryState::Ready
        } else {
            RetryState::Backoff
        }
    }

    /// Record a failed delivery attempt
    pub fn set_fail(&mut self) {
        self.set_fail_at(Utc::now());
    }

    pub fn set_fail_at(&mut self, now: DateTime<Utc>) {
        self.failure_count = self.failure_count.saturating_add(1);
        if self.is_obsolete() {
            return;
        }

        let mut next = now + backoff(self.failure_count);
        // retry_at only ever moves forward, even if the wall clock stepped back
        if let Some(previous) = self.retry_at {
            if next <= previous {
                next = previous + Duration::seconds(1);
            }
        }
        self.retry_at = Some(next);
    }

    /// Make the event eligible immediately, keeping its failure count
    pub fn restart_ready(&mut self) {
        self.restart_ready_at(Utc::now());
    }

    pub fn restart_ready_at(&mut self, now: DateTime<Utc>) {
        if self.is_obsolete() {
            return;
        }
        if self.retry_at.is_some() {
            self.retry_at = Some(now);
        }
    }
}

impl fmt::Display for CommitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Delay before retry number `failure_count`: `BACKOFF_BASE * 2^(n-1)`
pub fn backoff(failure_count: u32) -> Duration {
    let exponent = failure_count.saturating_sub(1).min(20);
    Duration::seconds(BACKOFF_BASE_SECS * (1_i64 << exponent))
}

/// Hex SHA-256 over the canonical JSON of (type, ids, action, tenant)
pub fn fingerprint(
    object_type: &str,
    object_ids: &[String],
    action: Action,
    tenant_identity: &str,
) -> CommitResult<String> {
    let canonical = serde_json::to_vec(&(object_type, object_ids, action, tenant_identity))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_code;

    fn event(ids: impl Into<ObjectIds>, action: Action, tenant: &str) -> CommitEvent {
        CommitEvent::new(tenant, "contact", ids, action, "admin", "").unwrap()
    }

    #[test]
    fn test_fingerprint_scalar_equals_list() {
        let a = event(5, Action::Update, "hub-1");
        let b = event(vec![5], Action::Update, "hub-1");
        let c = event("5", Action::Update, "hub-1");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_each_component() {
        let base = event(5, Action::Update, "hub-1");

        assert_ne!(base.fingerprint(), event(5, Action::Delete, "hub-1").fingerprint());
        assert_ne!(base.fingerprint(), event(6, Action::Update, "hub-1").fingerprint());
        assert_ne!(base.fingerprint(), event(5, Action::Update, "hub-2").fingerprint());

        let other_type = CommitEvent::new("hub-1", "order", 5, Action::Update, "admin", "").unwrap();
        assert_ne!(base.fingerprint(), other_type.fingerprint());
    }

    #[test]
    fn test_fingerprint_keeps_id_order() {
        let a = event(vec![1, 2], Action::Update, "hub-1");
        let b = event(vec![2, 1], Action::Update, "hub-1");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_user_and_comment_not_in_fingerprint() {
        let a = CommitEvent::new("hub-1", "contact", 5, Action::Update, "alice", "first").unwrap();
        let b = CommitEvent::new("hub-1", "contact", 5, Action::Update, "bob", "second").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert_error_code(
            CommitEvent::new("hub-1", "contact", Vec::<i64>::new(), Action::Create, "", ""),
            "V002",
        );
    }

    #[test]
    fn test_accessors_and_struct() {
        let e = CommitEvent::new("hub-1", "contact", vec!["3", "4", "3"], Action::Create, "admin", "import").unwrap();
        assert_eq!(e.object_type(), "contact");
        assert_eq!(e.action(), Action::Create);
        assert_eq!(e.object_ids(), &["3".to_string(), "4".to_string()]);
        assert_eq!(e.tenant_identity(), "hub-1");

        let s = e.to_struct();
        assert_eq!(s.id, vec!["3".to_string(), "4".to_string()]);
        assert_eq!(s.user, "admin");
        assert_eq!(s.comment, "import");

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["type"], "contact");
        assert_eq!(json["action"], "create");

        assert!(e.description().contains("create contact [3, 4]"));
    }

    #[test]
    fn test_retry_until_obsolete() {
        let mut e = event(1, Action::Update, "hub-1");
        assert!(e.is_ready());
        assert_eq!(e.retry_at(), None);
        assert!(!e.is_obsolete());

        let mut previous: Option<DateTime<Utc>> = None;
        for _ in 0..5 {
            e.set_fail();
            assert!(!e.is_ready());
            assert!(!e.is_obsolete());
            assert_eq!(e.state(), RetryState::Backoff);

            let retry_at = e.retry_at().unwrap();
            if let Some(previous) = previous {
                assert!(retry_at > previous);
            }
            previous = Some(retry_at);
        }

        e.set_fail();
        assert!(e.is_obsolete());
        assert!(!e.is_ready());
        assert_eq!(e.state(), RetryState::Obsolete);
    }

    #[test]
    fn test_backoff_elapses() {
        let now = Utc::now();
        let mut e = event(1, Action::Update, "hub-1");
        e.set_fail_at(now);

        assert!(!e.is_ready_at(now));
        assert!(!e.is_ready_at(now + Duration::seconds(59)));
        assert!(e.is_ready_at(now + Duration::seconds(60)));
    }

    #[test]
    fn test_retry_at_monotonic_when_clock_steps_back() {
        let now = Utc::now();
        let mut e = event(1, Action::Update, "hub-1");
        e.set_fail_at(now);
        let first = e.retry_at().unwrap();

        e.set_fail_at(now - Duration::hours(1));
        assert!(e.retry_at().unwrap() > first);
    }

    #[test]
    fn test_restart_ready_keeps_failure_count() {
        let mut e = event(1, Action::Update, "hub-1");
        e.set_fail();
        e.set_fail();
        assert!(!e.is_ready());

        e.restart_ready();
        assert!(e.is_ready());
        assert_eq!(e.failure_count(), 2);
        assert!(e.retry_at().is_some());
    }

    #[test]
    fn test_restart_ready_does_not_revive_obsolete() {
        let mut e = event(1, Action::Update, "hub-1");
        for _ in 0..=MAX_FAILURES {
            e.set_fail();
        }
        e.restart_ready();
        assert!(e.is_obsolete());
        assert!(!e.is_ready());
    }

    #[test]
    fn test_backoff_curve() {
        assert_eq!(backoff(1), Duration::seconds(60));
        assert_eq!(backoff(2), Duration::seconds(120));
        assert_eq!(backoff(5), Duration::seconds(960));
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("Update".parse::<Action>().unwrap(), Action::Update);
        assert_error_code("merge".parse::<Action>(), "V003");
    }
}
