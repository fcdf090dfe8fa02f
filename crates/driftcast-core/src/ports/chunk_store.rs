//! Chunk store port definition.
//!
//! The store is the only coordination point between the producer and
//! consumer loops: an ordered durable record set with atomic append and
//! atomic evict. Any substrate works (flat files, embedded KV, append log)
//! as long as the ordering and atomicity invariants hold:
//!
//! - sequence numbers are issued strictly increasing and never reused;
//! - an append is all-or-nothing (payload + metadata commit as one unit);
//! - a finite capacity is never exceeded after an append returns;
//! - `Consumed` is one-way.
//!
//! Mutations serialize through a single exclusive critical section per
//! store; read-only queries run against a consistent snapshot. Synthesis
//! (minutes-long) must never run inside the mutation lock.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chunk::{AppendOutcome, BufferStats, ChunkRecord, NewChunk};
use crate::domain::session::SessionProgress;

/// Errors that can occur in chunk store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure; transient, callers may retry bounded.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata document exists but cannot be used; triggers recovery.
    #[error("metadata document is corrupt: {0}")]
    Corrupt(String),

    /// No record with that sequence number is stored.
    #[error("chunk {0} not found")]
    UnknownSequence(u64),

    /// The append would evict never-consumed content and the policy is
    /// configured to refuse that rather than silently shrink the runway.
    #[error("append refused: would evict unconsumed chunk {0}")]
    EvictionRefused(u64),

    /// Stored count exceeds capacity after eviction ran. A logic defect,
    /// never to be tolerated silently.
    #[error("capacity invariant violated: {count} records stored, capacity {capacity}")]
    CapacityInvariant { count: usize, capacity: usize },

    #[error("metadata serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Port for the durable chunk buffer.
///
/// Implemented by `FsChunkStore` in `driftcast-store`. Consumed by the
/// producer, consumer, and session loops in `driftcast-engine`.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// The sequence number the next committed append will receive: one past
    /// the highest ever issued. Failed synthesis attempts never advance it.
    async fn next_sequence(&self) -> u64;

    /// Durably persist a chunk payload and its metadata entry as one atomic
    /// unit, then apply the capacity policy. No partially-visible state
    /// survives a crash between the two.
    async fn append_chunk(&self, chunk: NewChunk) -> Result<AppendOutcome, StoreError>;

    /// The lowest-sequence `Available` record, or `None` when the buffer has
    /// nothing left to stream. Reflects the latest committed state.
    async fn next_unconsumed(&self) -> Result<Option<ChunkRecord>, StoreError>;

    /// Mark a record consumed. Idempotent: re-marking an already-consumed
    /// record is a no-op. Unknown sequences are an error.
    async fn mark_consumed(&self, sequence: u64) -> Result<(), StoreError>;

    /// Read the raw payload bytes of a stored chunk.
    async fn read_payload(&self, sequence: u64) -> Result<Vec<u8>, StoreError>;

    /// Payload paths of all stored chunks in sequence order, for stitching.
    async fn payload_paths(&self) -> Result<Vec<PathBuf>, StoreError>;

    /// Aggregate statistics over the stored record set.
    async fn stats(&self) -> Result<BufferStats, StoreError>;

    /// Prompt index of the most recently delivered chunk, if any. Persisted
    /// so a restarted consumer makes the same break decisions.
    async fn last_streamed_prompt(&self) -> Result<Option<usize>, StoreError>;

    /// Record the prompt index of a successfully delivered chunk.
    async fn set_last_streamed_prompt(&self, index: usize) -> Result<(), StoreError>;

    /// Weekly session progress (library variant), if any has been recorded.
    async fn session_progress(&self) -> Result<Option<SessionProgress>, StoreError>;

    /// Persist weekly session progress.
    async fn set_session_progress(&self, progress: SessionProgress) -> Result<(), StoreError>;
}
