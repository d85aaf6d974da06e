//! Waiting-queue persistence
//!
//! This module handles serialization and deserialization of the waiting
//! queue for stores that hold it as an opaque blob (files, cache entries,
//! database rows). Supports JSON, binary and compressed JSON formats.

use serde::{Deserialize, Serialize};
use crate::config::StoreFormat;
use crate::error::{CommitError, CommitResult};
use crate::queue::CommitEvent;

/// Current schema version of [`SerializedQueue`]
pub const SCHEMA_VERSION: u32 = 1;

/// Serialized queue format for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedQueue {
    /// Schema version for forward compatibility
    pub version: u32,
    /// Optimistic concurrency counter, bumped on every save
    pub store_version: u64,
    /// Waiting events in FIFO order
    pub events: Vec<CommitEvent>,
    /// Metadata about when and how the queue was written
    pub metadata: QueueMetadata,
}

/// Metadata for queue serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetadata {
    /// RFC 3339 timestamp of the write
    pub saved_at: String,
    /// Process that wrote the queue
    pub source_process: u32,
}

impl SerializedQueue {
    pub fn new(store_version: u64, events: Vec<CommitEvent>) -> Self {
        Self {
            version: SCHEMA_VERSION,
            store_version,
            events,
            metadata: QueueMetadata {
                saved_at: chrono::Utc::now().to_rfc3339(),
                source_process: std::process::id(),
            },
        }
    }

    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    /// Encode with the given format
    pub fn encode(&self, format: StoreFormat) -> CommitResult<Vec<u8>> {
        match format {
            StoreFormat::Json => self.to_json(),
            StoreFormat::Binary => self.to_binary(),
            StoreFormat::CompressedJson => self.to_compressed_json(),
        }
    }

    /// Decode with the given format, rejecting unknown schema versions
    pub fn decode(data: &[u8], format: StoreFormat) -> CommitResult<Self> {
        let queue = match format {
            StoreFormat::Json => Self::from_json(data)?,
            StoreFormat::Binary => Self::from_binary(data)?,
            StoreFormat::CompressedJson => Self::from_compressed_json(data)?,
        };

        if queue.version > SCHEMA_VERSION {
            return Err(CommitError::SerializationError {
                message: format!(
                    "Queue schema version {} is newer than supported version {}",
                    queue.version, SCHEMA_VERSION
                ),
            });
        }

        Ok(queue)
    }

    /// Serialize to JSON (human-readable, easier debugging)
    pub fn to_json(&self) -> CommitResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to serialize queue to JSON: {e}"),
            })
    }

    pub fn from_json(data: &[u8]) -> CommitResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to deserialize queue from JSON: {e}"),
            })
    }

    /// Serialize to binary format (compact, faster for large queues)
    pub fn to_binary(&self) -> CommitResult<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to serialize queue to binary: {e}"),
            })
    }

    pub fn from_binary(data: &[u8]) -> CommitResult<Self> {
        bincode::deserialize(data)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to deserialize binary queue: {e}"),
            })
    }

    /// Serialize to compressed JSON (balance of readability and size)
    pub fn to_compressed_json(&self) -> CommitResult<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let json = serde_json::to_vec(self)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to serialize queue to JSON: {e}"),
            })?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to compress queue: {e}"),
            })?;

        encoder.finish()
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to finish compression: {e}"),
            })
    }

    pub fn from_compressed_json(data: &[u8]) -> CommitResult<Self> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(data);
        let mut json_bytes = Vec::new();
        decoder.read_to_end(&mut json_bytes)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Decompression failed: {e}"),
            })?;

        serde_json::from_slice(&json_bytes)
            .map_err(|e| CommitError::SerializationError {
                message: format!("Failed to deserialize JSON: {e}"),
            })
    }
}
