//! Core domain types and port definitions for driftcast.
//!
//! driftcast decouples slow, expensive audio synthesis from continuous
//! fixed-rate streaming through a durable, bounded, health-monitored chunk
//! buffer. This crate holds the pure domain (chunk records, health ladder,
//! prompt rotation, session accounting), the configuration layer, and the
//! port traits behind which every external collaborator lives. No I/O
//! happens here.

pub mod config;
pub mod domain;
pub mod ports;

// Re-export commonly used types for convenience
pub use config::{BufferConfig, CapacityPolicy, ConfigError};
pub use domain::{
    AppendOutcome, BufferStats, ChunkRecord, ChunkStatus, HealthReading, HealthState,
    HealthThresholds, NewChunk, PromptTable, SessionOutcome, SessionProgress, WeeklyProgress,
    chunk_filename, needs_break, parse_chunk_filename, week_id_for,
};
pub use ports::{
    ChunkStore, DeliveryError, DeliverySink, SelectionStrategy, StitchError, Stitcher, StoreError,
    Synthesizer, SynthesisError,
};
