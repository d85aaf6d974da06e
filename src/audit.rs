use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::queue::CommitEvent;

/// Audit operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Delivered to the hub
    Delivered,
    /// Dropped after exhausting its retry budget
    Dropped,
}

/// One audit line, emitted on the `hub_commit::audit` target
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub operation: AuditOperation,
    pub object_type: String,
    pub action: String,
    pub object_ids: Vec<String>,
    pub fingerprint: String,
    pub failure_count: u32,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(operation: AuditOperation, event: &CommitEvent) -> Self {
        Self {
            operation,
            object_type: event.object_type().to_string(),
            action: event.action().to_string(),
            object_ids: event.object_ids().to_vec(),
            fingerprint: event.fingerprint().to_string(),
            failure_count: event.failure_count(),
            at: Utc::now(),
        }
    }
}

fn emit(record: &AuditRecord) {
    let details = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    info!(
        target: "hub_commit::audit",
        operation = ?record.operation,
        fingerprint = %record.fingerprint,
        details = %details,
        "commit audit"
    );
}

/// Log a delivered commit
pub fn log_delivered(event: &CommitEvent) -> AuditRecord {
    let record = AuditRecord::new(AuditOperation::Delivered, event);
    emit(&record);
    record
}

/// Log a commit dropped as obsolete
pub fn log_dropped(event: &CommitEvent) -> AuditRecord {
    let record = AuditRecord::new(AuditOperation::Dropped, event);
    emit(&record);
    record
}
