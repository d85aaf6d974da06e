//! Durable stores for the waiting queue
//!
//! The manager never holds the queue in process memory alone: every write
//! goes through a [`Store`], and every `reset` re-reads it.
//!
//! ## Concurrency
//!
//! Stores use optimistic compare-and-swap. `load` returns the queue together
//! with a version counter; `save` only succeeds when the caller's expected
//! version is still current, otherwise it fails with
//! [`CommitError::StoreConflict`] and the caller reloads and retries. Two
//! writers appending different events therefore never silently lose one.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::persistence::SerializedQueue;
use crate::config::StoreFormat;
use crate::error::{CommitError, CommitResult};
use crate::queue::CommitEvent;

/// Lock files older than this are considered left behind by a dead process
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// Attempts at acquiring a file store lock before giving up
const LOCK_ATTEMPTS: u32 = 200;

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Queue contents plus the version they were read at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredQueue {
    pub version: u64,
    pub events: Vec<CommitEvent>,
}

/// Durable, shared home of the waiting queue
pub trait Store: Send + Sync {
    /// Short name used in errors and logs
    fn name(&self) -> &str;

    /// Read the whole queue in FIFO order
    fn load(&self) -> CommitResult<StoredQueue>;

    /// Replace the queue if it is still at `expected_version`.
    ///
    /// Returns the new version.
    fn save(&self, events: &[CommitEvent], expected_version: u64) -> CommitResult<u64>;
}

// ============ In-memory store ============

/// Store backed by shared memory
///
/// Models a shared cache entry: wrap it in an `Arc` and hand the same
/// instance to every manager that should see the same queue.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoredQueue>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StoreUnavailable` until re-enabled
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> CommitResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CommitError::StoreUnavailable {
                store: self.name().to_string(),
                reason: "store is offline".to_string(),
            });
        }
        Ok(())
    }

    fn guard(&self) -> CommitResult<std::sync::MutexGuard<'_, StoredQueue>> {
        self.inner.lock().map_err(|_| CommitError::StoreUnavailable {
            store: self.name().to_string(),
            reason: "store mutex poisoned".to_string(),
        })
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> CommitResult<StoredQueue> {
        self.check_available()?;
        Ok(self.guard()?.clone())
    }

    fn save(&self, events: &[CommitEvent], expected_version: u64) -> CommitResult<u64> {
        self.check_available()?;
        let mut current = self.guard()?;

        if current.version != expected_version {
            return Err(CommitError::StoreConflict {
                expected_version,
                found_version: current.version,
            });
        }

        current.version += 1;
        current.events = events.to_vec();
        Ok(current.version)
    }
}

// ============ File store ============

/// Store backed by a single file
///
/// Writes go to a temporary sibling and are renamed into place, so readers
/// never see a half-written queue. A `.lock` sibling created exclusively
/// serializes compare-and-swap across processes.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    format: StoreFormat,
    local: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, format: StoreFormat) -> Self {
        Self {
            path: path.into(),
            format,
            local: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> CommitError {
        CommitError::StoreUnavailable {
            store: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn read_queue(&self) -> CommitResult<SerializedQueue> {
        match fs::read(&self.path) {
            Ok(bytes) => SerializedQueue::decode(&bytes, self.format),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(SerializedQueue::empty()),
            Err(e) => Err(self.unavailable(e)),
        }
    }

    fn acquire_lock(&self) -> CommitResult<FileLock> {
        let lock_path = self.sibling(".lock");

        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(mut file) => {
                    // Owner pid, for whoever has to clean up by hand
                    if let Err(e) = writeln!(file, "{}", std::process::id()) {
                        debug!(path = %lock_path.display(), error = %e, "could not record lock owner");
                    }
                    return Ok(FileLock { path: lock_path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&lock_path) {
                        self.break_stale_lock(&lock_path);
                        continue;
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => return Err(self.unavailable(e)),
            }
        }

        Err(self.unavailable(format!("could not acquire {}", lock_path.display())))
    }

    /// Remove a stale lock, at most one waiter at a time.
    ///
    /// Staleness is checked again while holding the `.lock.break` marker:
    /// a waiter that lost the race would otherwise delete the fresh lock the
    /// winner just created.
    fn break_stale_lock(&self, lock_path: &Path) {
        let break_path = self.sibling(".lock.break");

        match OpenOptions::new().write(true).create_new(true).open(&break_path) {
            Ok(_) => {
                if is_stale(lock_path) {
                    warn!(path = %lock_path.display(), "removing stale queue lock");
                    if let Err(e) = fs::remove_file(lock_path) {
                        debug!(path = %lock_path.display(), error = %e, "stale lock already gone");
                    }
                }
                if let Err(e) = fs::remove_file(&break_path) {
                    warn!(path = %break_path.display(), error = %e, "could not release lock break marker");
                }
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Marker left by a process that died mid-break
                if is_stale(&break_path) && fs::remove_file(&break_path).is_ok() {
                    warn!(path = %break_path.display(), "removed stale lock break marker");
                }
                std::thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(e) => debug!(path = %break_path.display(), error = %e, "could not create lock break marker"),
        }
    }
}

impl Store for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn load(&self) -> CommitResult<StoredQueue> {
        let queue = self.read_queue()?;
        Ok(StoredQueue {
            version: queue.store_version,
            events: queue.events,
        })
    }

    fn save(&self, events: &[CommitEvent], expected_version: u64) -> CommitResult<u64> {
        let _local = self.local.lock().map_err(|_| self.unavailable("store mutex poisoned"))?;
        let _lock = self.acquire_lock()?;

        let current = self.read_queue()?;
        if current.store_version != expected_version {
            return Err(CommitError::StoreConflict {
                expected_version,
                found_version: current.store_version,
            });
        }

        let next_version = expected_version + 1;
        let bytes = SerializedQueue::new(next_version, events.to_vec()).encode(self.format)?;

        let tmp_path = self.sibling(".tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| self.unavailable(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.unavailable(e))?;

        debug!(path = %self.path.display(), version = next_version, events = events.len(), "queue saved");
        Ok(next_version)
    }
}

/// Exclusive lock file, removed on drop
struct FileLock {
    path: PathBuf,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::{assert_error_code, assert_error_contains};
    use crate::queue::Action;

    fn event(id: i64) -> CommitEvent {
        CommitEvent::new("hub-1", "contact", id, Action::Update, "admin", "").unwrap()
    }

    #[test]
    fn test_memory_store_cas() {
        let store = MemoryStore::new();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 0);
        assert!(loaded.events.is_empty());

        let saved = vec![event(1)];
        let v1 = store.save(&saved, 0).unwrap();
        assert_eq!(v1, 1);

        // A writer still holding version 0 loses
        assert_error_code(store.save(&[event(2)], 0), "S002");

        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.events, saved);
    }

    #[test]
    fn test_memory_store_outage() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert_error_code(store.load(), "S001");
        store.set_available(true);
        assert!(store.load().is_ok());
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"), StoreFormat::Json);
        assert_eq!(store.load().unwrap(), StoredQueue::default());
    }

    #[test]
    fn test_file_store_round_trip_each_format() {
        let dir = tempfile::tempdir().unwrap();

        for (name, format) in [
            ("q.json", StoreFormat::Json),
            ("q.bin", StoreFormat::Binary),
            ("q.json.gz", StoreFormat::CompressedJson),
        ] {
            let store = FileStore::new(dir.path().join(name), format);
            let events = vec![event(1), event(2)];

            assert_eq!(store.save(&events, 0).unwrap(), 1);
            let loaded = store.load().unwrap();
            assert_eq!(loaded.version, 1);
            assert_eq!(loaded.events, events);

            // Second handle on the same file sees the same state
            let other = FileStore::new(dir.path().join(name), format);
            assert_error_code(other.save(&[], 0), "S002");
            assert_eq!(other.save(&[], 1).unwrap(), 2);
            assert!(store.load().unwrap().events.is_empty());
        }
    }

    #[test]
    fn test_file_store_leaves_no_lock_or_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"), StoreFormat::Json);
        store.save(&[event(1)], 0).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["queue.json".to_string()]);
    }

    fn backdate(path: &Path, age: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_file_store_breaks_stale_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"), StoreFormat::Json);

        let lock_path = store.sibling(".lock");
        fs::write(&lock_path, b"99999\n").unwrap();
        backdate(&lock_path, STALE_LOCK_AGE * 2);

        assert_eq!(store.save(&[event(1)], 0).unwrap(), 1);
        assert!(!lock_path.exists());
        assert!(!store.sibling(".lock.break").exists());
    }

    #[test]
    fn test_file_store_keeps_fresh_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"), StoreFormat::Json);

        let lock_path = store.sibling(".lock");
        fs::write(&lock_path, b"99999\n").unwrap();

        assert_error_code(store.save(&[event(1)], 0), "S001");
        assert!(lock_path.exists());
        assert!(store.load().unwrap().events.is_empty());
    }

    #[test]
    fn test_stale_check_rejects_fresh_lock_after_break() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"), StoreFormat::Json);
        let lock_path = store.sibling(".lock");

        // Another waiter already replaced the stale lock with its own
        fs::write(&lock_path, b"12345\n").unwrap();
        store.break_stale_lock(&lock_path);

        assert!(lock_path.exists());
        assert!(!store.sibling(".lock.break").exists());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, b"{ nope").unwrap();

        let store = FileStore::new(&path, StoreFormat::Json);
        assert_error_contains(store.load(), "Failed to deserialize");
    }
}
