use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::event::{Action, CommitEvent};
use super::ids::{normalize_object_ids, to_object_ids, ObjectIds};
use super::lock::LockRegistry;
use super::store::{Store, StoredQueue};
use crate::config::{Configuration, STORE_CAS_RETRIES};
use crate::error::{CommitError, CommitResult};
use crate::metrics::{metrics_api, CommitStats};
use crate::registry::ObjectRegistry;
use crate::transport::{deliver, Transport};

/// What `try_commit` did with a commit request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Immediate mode: the hub acknowledged the commit
    Sent,
    /// Immediate mode: the hub refused or could not be reached
    Rejected,
    /// Deferred mode: appended to the waiting queue
    Queued,
    /// Deferred mode: an equivalent event was already waiting
    Coalesced,
    /// A lock suppressed the commit; nothing was recorded
    Suppressed,
}

impl CommitOutcome {
    /// Boolean seen by host code: only a refused send is a failure.
    ///
    /// A suppressed echo is a silent no-op, not an error.
    pub fn is_success(&self) -> bool {
        !matches!(self, CommitOutcome::Rejected)
    }
}

/// Counts from one `execute_post_commit` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
    pub skipped: usize,
}

/// Result of one drained event, applied to the store afterwards
enum DrainOutcome {
    Remove,
    Replace(CommitEvent),
}

/// Entry point for host code: commits, locks and the deferred queue
///
/// One manager serves one unit of work (a request or a cron tick). Call
/// [`reset`](Self::reset) at the start of each unit so changes other
/// processes made to the store become visible.
pub struct CommitQueueManager {
    config: Configuration,
    transport: Box<dyn Transport>,
    store: Arc<dyn Store>,
    registry: Box<dyn ObjectRegistry>,
    locks: LockRegistry,
    waiting: StoredQueue,
    session_committed: Vec<CommitEvent>,
    post_commit_override: Option<bool>,
}

impl CommitQueueManager {
    pub fn new(
        config: Configuration,
        transport: Box<dyn Transport>,
        store: Arc<dyn Store>,
        registry: Box<dyn ObjectRegistry>,
    ) -> CommitResult<Self> {
        config.validate()?;

        let mut manager = Self {
            locks: LockRegistry::new(config.force_commit),
            config,
            transport,
            store,
            registry,
            waiting: StoredQueue::default(),
            session_committed: Vec::new(),
            post_commit_override: None,
        };
        manager.reset()?;
        Ok(manager)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Reload the waiting queue from the store and clear the session log
    pub fn reset(&mut self) -> CommitResult<()> {
        self.waiting = self.store.load()?;
        self.session_committed.clear();
        debug!(store = self.store.name(), waiting = self.waiting.events.len(), "commit queue reset");
        Ok(())
    }

    /// Override the configured delivery mode; `None` restores the configuration value
    pub fn set_post_commit_mode(&mut self, enabled: Option<bool>) {
        self.post_commit_override = enabled;
    }

    pub fn is_post_commit_mode(&self) -> bool {
        self.post_commit_override.unwrap_or(self.config.ws_post_commit)
    }

    pub fn is_valid_object_type(&self, object_type: &str) -> bool {
        self.registry.is_valid_type(object_type)
    }

    pub fn to_object_ids(&self, ids: impl Into<ObjectIds>) -> Vec<String> {
        to_object_ids(ids)
    }

    // ============ Locks ============

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn locks_mut(&mut self) -> &mut LockRegistry {
        &mut self.locks
    }

    pub fn lock(&mut self, object_type: &str, id: &str) {
        self.locks.lock(object_type, id);
    }

    pub fn unlock(&mut self, object_type: &str, id: &str) {
        self.locks.unlock(object_type, id);
    }

    pub fn is_locked(&self, object_type: &str, id: &str) -> bool {
        self.locks.is_locked(object_type, id)
    }

    pub fn lock_new(&mut self, object_type: &str) {
        self.locks.lock_new(object_type);
    }

    pub fn unlock_new(&mut self, object_type: &str) {
        self.locks.unlock_new(object_type);
    }

    /// Lock `id` until the returned guard drops.
    ///
    /// The guard derefs to the manager, so the mutation's own commit goes
    /// through it and is suppressed. A lock already held before the call is
    /// left in place on drop.
    pub fn lock_scoped(&mut self, object_type: &str, id: &str) -> ScopedLock<'_> {
        let release = !self.locks.is_locked(object_type, id);
        self.locks.lock(object_type, id);
        ScopedLock {
            manager: self,
            object_type: object_type.to_string(),
            id: id.to_string(),
            release,
        }
    }

    /// [`lock_scoped`](Self::lock_scoped) on the `"new"` sentinel
    pub fn lock_new_scoped(&mut self, object_type: &str) -> ScopedLock<'_> {
        self.lock_scoped(object_type, super::lock::NEW_OBJECT)
    }

    // ============ Commit ============

    /// Report a mutation; `false` means it was refused or could not be sent.
    ///
    /// Errors are logged here; use [`try_commit`](Self::try_commit) to get them.
    pub fn commit(
        &mut self,
        object_type: &str,
        ids: impl Into<ObjectIds>,
        action: Action,
        user: &str,
        comment: &str,
    ) -> bool {
        match self.try_commit(object_type, ids, action, user, comment) {
            Ok(outcome) => outcome.is_success(),
            Err(e) => {
                warn!(object_type, %action, code = e.code(), error = %e, "commit refused");
                false
            }
        }
    }

    pub fn try_commit(
        &mut self,
        object_type: &str,
        ids: impl Into<ObjectIds>,
        action: Action,
        user: &str,
        comment: &str,
    ) -> CommitResult<CommitOutcome> {
        let object_ids = match self.validate_commit(object_type, ids) {
            Ok(object_ids) => object_ids,
            Err(e) => {
                metrics_api::record_rejected();
                return Err(e);
            }
        };

        if !self.locks.is_allowed(object_type, &object_ids, action) {
            debug!(object_type, %action, ids = ?object_ids, "commit suppressed by lock");
            metrics_api::record_suppressed();
            return Ok(CommitOutcome::Suppressed);
        }

        let event = CommitEvent::new(
            &self.config.tenant_identity,
            object_type,
            object_ids,
            action,
            user,
            comment,
        )?;
        metrics_api::record_committed();

        if self.is_post_commit_mode() {
            return Ok(if self.add_waiting_event(event)? {
                CommitOutcome::Queued
            } else {
                CommitOutcome::Coalesced
            });
        }

        self.session_committed.push(event.clone());
        let delivered = deliver(self.transport.as_ref(), &event);
        metrics_api::record_delivery(delivered);

        if delivered {
            crate::audit::log_delivered(&event);
            Ok(CommitOutcome::Sent)
        } else {
            warn!(event = %event.description(), "immediate commit not acknowledged");
            Ok(CommitOutcome::Rejected)
        }
    }

    fn validate_commit(&self, object_type: &str, ids: impl Into<ObjectIds>) -> CommitResult<Vec<String>> {
        crate::validation::validate_object_type(object_type)?;
        if !self.is_valid_object_type(object_type) {
            return Err(CommitError::UnknownObjectType {
                object_type: object_type.to_string(),
            });
        }
        normalize_object_ids(object_type, ids)
    }

    // ============ Waiting queue ============

    /// Append `event` to the durable queue unless its fingerprint is already waiting.
    ///
    /// Returns `false` when the event was coalesced into an existing entry,
    /// which keeps its position and retry state.
    pub fn add_waiting_event(&mut self, event: CommitEvent) -> CommitResult<bool> {
        let mut last_error = None;

        for attempt in 0..STORE_CAS_RETRIES {
            let mut current = self.store.load()?;

            if current.events.iter().any(|e| e.fingerprint() == event.fingerprint()) {
                debug!(event = %event.description(), "commit coalesced into waiting event");
                self.waiting = current;
                metrics_api::record_coalesced();
                return Ok(false);
            }

            current.events.push(event.clone());
            match self.store.save(&current.events, current.version) {
                Ok(version) => {
                    current.version = version;
                    self.waiting = current;
                    metrics_api::record_queued();
                    debug!(event = %event.description(), waiting = self.waiting.events.len(), "commit queued");
                    return Ok(true);
                }
                Err(e @ CommitError::StoreConflict { .. }) => {
                    debug!(attempt, error = %e, "concurrent queue write, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| crate::internal_error!("CAS loop ended without an attempt")))
    }

    /// Queue contents as of the last reset or write, FIFO
    pub fn waiting_events(&self) -> &[CommitEvent] {
        &self.waiting.events
    }

    /// Every delivery attempt of this unit of work
    pub fn session_committed(&self) -> &[CommitEvent] {
        &self.session_committed
    }

    /// Deliver every ready waiting event, in order, one at a time
    pub fn execute_post_commit(&mut self) -> CommitResult<DrainReport> {
        let timer = metrics_api::record_drain_start();
        let snapshot = self.store.load()?;
        let mut report = DrainReport::default();
        let mut outcomes: HashMap<String, (DateTime<Utc>, DrainOutcome)> = HashMap::new();

        for event in &snapshot.events {
            if !event.is_ready() {
                report.skipped += 1;
                continue;
            }

            let delivered = deliver(self.transport.as_ref(), event);
            metrics_api::record_delivery(delivered);

            let outcome = if delivered {
                report.delivered += 1;
                crate::audit::log_delivered(event);
                self.session_committed.push(event.clone());
                DrainOutcome::Remove
            } else {
                report.failed += 1;
                let mut failed = event.clone();
                failed.set_fail();

                if failed.is_obsolete() {
                    report.dropped += 1;
                    metrics_api::record_dropped();
                    crate::audit::log_dropped(&failed);
                    warn!(event = %failed.description(), failures = failed.failure_count(), "dropping undeliverable commit");
                    DrainOutcome::Remove
                } else {
                    debug!(event = %failed.description(), retry_at = ?failed.retry_at(), "commit delivery deferred");
                    DrainOutcome::Replace(failed)
                }
            };
            outcomes.insert(event.fingerprint().to_string(), (event.created_at(), outcome));
        }

        if outcomes.is_empty() {
            self.waiting = snapshot;
        } else {
            self.apply_drain_outcomes(snapshot, &outcomes)?;
        }

        metrics_api::record_drain_complete(timer);
        if report.delivered + report.failed > 0 {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                dropped = report.dropped,
                skipped = report.skipped,
                "post-commit drain finished"
            );
        }
        Ok(report)
    }

    /// Write drain results into the current store contents.
    ///
    /// Events appended by other writers while the drain ran are kept. An
    /// outcome only applies to the same enqueue it was computed for, matched
    /// by fingerprint and creation time.
    fn apply_drain_outcomes(
        &mut self,
        snapshot: StoredQueue,
        outcomes: &HashMap<String, (DateTime<Utc>, DrainOutcome)>,
    ) -> CommitResult<()> {
        let mut current = snapshot;
        let mut last_error = None;

        for attempt in 0..STORE_CAS_RETRIES {
            if attempt > 0 {
                current = self.store.load()?;
            }

            let merged: Vec<CommitEvent> = current
                .events
                .iter()
                .filter_map(|e| match outcomes.get(e.fingerprint()) {
                    Some((created_at, outcome)) if *created_at == e.created_at() => match outcome {
                        DrainOutcome::Remove => None,
                        DrainOutcome::Replace(updated) => Some(updated.clone()),
                    },
                    _ => Some(e.clone()),
                })
                .collect();

            match self.store.save(&merged, current.version) {
                Ok(version) => {
                    self.waiting = StoredQueue { version, events: merged };
                    return Ok(());
                }
                Err(e @ CommitError::StoreConflict { .. }) => {
                    debug!(attempt, error = %e, "concurrent queue write during drain, merging again");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| crate::internal_error!("CAS loop ended without an attempt")))
    }

    /// Make every waiting event eligible for the next drain
    pub fn restart_all(&mut self) -> CommitResult<()> {
        let mut last_error = None;

        for attempt in 0..STORE_CAS_RETRIES {
            let mut current = self.store.load()?;
            let now = Utc::now();
            for event in &mut current.events {
                event.restart_ready_at(now);
            }

            match self.store.save(&current.events, current.version) {
                Ok(version) => {
                    current.version = version;
                    self.waiting = current;
                    return Ok(());
                }
                Err(e @ CommitError::StoreConflict { .. }) => {
                    debug!(attempt, error = %e, "concurrent queue write during restart, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| crate::internal_error!("CAS loop ended without an attempt")))
    }

    pub fn stats(&self) -> CommitStats {
        metrics_api::get_stats(self.waiting.events.len())
    }
}

/// Lock held for the guard's lifetime; see [`CommitQueueManager::lock_scoped`]
pub struct ScopedLock<'a> {
    manager: &'a mut CommitQueueManager,
    object_type: String,
    id: String,
    release: bool,
}

impl Deref for ScopedLock<'_> {
    type Target = CommitQueueManager;

    fn deref(&self) -> &CommitQueueManager {
        self.manager
    }
}

impl DerefMut for ScopedLock<'_> {
    fn deref_mut(&mut self) -> &mut CommitQueueManager {
        self.manager
    }
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        if self.release {
            self.manager.locks.unlock(&self.object_type, &self.id);
        }
    }
}
