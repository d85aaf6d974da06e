//! Change-notification core of a hub connector
//!
//! Host code reports local mutations through [`CommitQueueManager`]. Each
//! report is either sent to the remote hub right away or appended to a
//! durable, deduplicated waiting queue that a later drain delivers with
//! retry and backoff. Locks suppress the echo of changes the hub itself
//! pushed down.

pub mod audit;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod validation;

pub use config::Configuration;
pub use error::{CommitError, CommitResult};
pub use queue::{Action, CommitEvent, CommitOutcome, CommitQueueManager, DrainReport, LockRegistry};
pub use registry::{ObjectRegistry, StaticObjectRegistry};
pub use transport::Transport;

/// Version of the hub_commit crate
pub fn hub_commit_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(hub_commit_version(), "0.1.0-beta.1");
    }
}
