use std::collections::{HashMap, HashSet};
use super::event::Action;

/// Lock identifier standing for "object not created yet"
pub const NEW_OBJECT: &str = "new";

/// Per-object-type sets of identifiers whose commits are suppressed
///
/// Host code locks an object while it applies a change pushed by the hub, so
/// the local write does not echo back as a fresh commit. Locks are process
/// local and scoped to one unit of work.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    locked: HashMap<String, HashSet<String>>,
    force_commit: bool,
}

impl LockRegistry {
    pub fn new(force_commit: bool) -> Self {
        Self {
            locked: HashMap::new(),
            force_commit,
        }
    }

    pub fn force_commit(&self) -> bool {
        self.force_commit
    }

    /// Lock `id` for `object_type` (idempotent)
    pub fn lock(&mut self, object_type: &str, id: &str) {
        self.locked
            .entry(object_type.to_string())
            .or_default()
            .insert(id.to_string());
    }

    /// Unlock `id` for `object_type`; no-op if it was not locked
    pub fn unlock(&mut self, object_type: &str, id: &str) {
        if let Some(ids) = self.locked.get_mut(object_type) {
            ids.remove(id);
            if ids.is_empty() {
                self.locked.remove(object_type);
            }
        }
    }

    pub fn is_locked(&self, object_type: &str, id: &str) -> bool {
        self.locked
            .get(object_type)
            .is_some_and(|ids| ids.contains(id))
    }

    pub fn lock_new(&mut self, object_type: &str) {
        self.lock(object_type, NEW_OBJECT);
    }

    pub fn unlock_new(&mut self, object_type: &str) {
        self.unlock(object_type, NEW_OBJECT);
    }

    pub fn is_new_locked(&self, object_type: &str) -> bool {
        self.is_locked(object_type, NEW_OBJECT)
    }

    /// Whether a commit of `action` on `object_ids` may go out.
    ///
    /// Every action is blocked by a lock on any of the ids. Create is also
    /// blocked by the `"new"` lock, since a just-created object has no stable
    /// id yet; `"new"` never blocks Update or Delete.
    pub fn is_allowed(&self, object_type: &str, object_ids: &[String], action: Action) -> bool {
        if self.force_commit {
            return true;
        }

        if action == Action::Create && self.is_new_locked(object_type) {
            return false;
        }

        !object_ids
            .iter()
            .filter(|id| id.as_str() != NEW_OBJECT)
            .any(|id| self.is_locked(object_type, id))
    }

    /// Locked ids for `object_type`, sorted (for introspection)
    pub fn locked_ids(&self, object_type: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .locked
            .get(object_type)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn clear(&mut self) {
        self.locked.clear();
    }
}
