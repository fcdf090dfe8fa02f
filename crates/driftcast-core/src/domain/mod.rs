//! Domain types for the chunk buffer.

pub mod chunk;
pub mod health;
pub mod prompts;
pub mod session;

pub use chunk::{
    AppendOutcome, BufferStats, ChunkRecord, ChunkStatus, NewChunk, chunk_filename,
    parse_chunk_filename,
};
pub use health::{HealthReading, HealthState, HealthThresholds};
pub use prompts::{PromptTable, needs_break};
pub use session::{SessionOutcome, SessionProgress, WeeklyProgress, week_id_for};
