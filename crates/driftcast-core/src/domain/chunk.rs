//! Chunk records, buffer statistics, and the payload filename scheme.
//!
//! A chunk is one fixed-duration unit of produced audio. Its metadata record
//! is the unit of coordination between the producer and consumer loops: the
//! producer creates records, the consumer flips them to `Consumed`, and the
//! capacity policy removes them. Sequence numbers are issued from 1,
//! strictly increasing, and never reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consumption state of a chunk. The transition is one-way: a record never
/// goes back to `Available` once consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Produced and durable, not yet streamed.
    Available,
    /// Streamed to the delivery collaborator.
    Consumed,
}

/// Durable record of one produced audio chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Monotonic, unique, assigned at creation, never reused.
    pub sequence: u64,
    /// Payload file name inside the buffer directory.
    pub filename: String,
    /// Index into the prompt table this chunk was synthesized from.
    pub prompt_index: usize,
    /// Playable duration in seconds.
    pub duration_secs: u32,
    /// When the record was committed.
    pub created_at: DateTime<Utc>,
    /// When the chunk was streamed; absent until consumed.
    pub consumed_at: Option<DateTime<Utc>>,
    /// Consumption state.
    pub status: ChunkStatus,
}

impl ChunkRecord {
    /// Whether this chunk is still waiting to be streamed.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == ChunkStatus::Available
    }
}

/// A freshly synthesized chunk handed to the store for durable commit.
///
/// The store assigns the sequence number at commit time; a failed synthesis
/// therefore never advances the sequence counter.
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Prompt index the producer synthesized from.
    pub prompt_index: usize,
    /// Playable duration in seconds.
    pub duration_secs: u32,
    /// Raw audio payload.
    pub payload: Vec<u8>,
}

/// Result of a committed append, including any eviction fallout from the
/// capacity policy.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// The committed record.
    pub record: ChunkRecord,
    /// Records removed by the capacity policy during this append.
    pub evicted: Vec<ChunkRecord>,
    /// True when an eviction destroyed content that was never streamed.
    /// Loud by design: callers should surface this, not swallow it.
    pub evicted_unconsumed: bool,
}

/// Aggregate statistics over the stored record set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Total records currently stored (any status).
    pub total: usize,
    /// Records still waiting to be streamed.
    pub unconsumed: usize,
    /// Total playable duration of unconsumed records, in seconds.
    pub unconsumed_duration_secs: u64,
    /// Consumed records currently stored (retention may have deleted older ones).
    pub consumed: usize,
    /// Lifetime consumption counter; survives eviction.
    pub total_consumed: u64,
}

/// Build the payload filename for a chunk: `chunk_000042_prompt_3_60s.wav`.
#[must_use]
pub fn chunk_filename(sequence: u64, prompt_index: usize, duration_secs: u32) -> String {
    format!("chunk_{sequence:06}_prompt_{prompt_index}_{duration_secs}s.wav")
}

/// Parse `(sequence, prompt_index, duration_secs)` back out of a payload
/// filename. Returns `None` for anything that does not match the scheme;
/// recovery skips such files with a warning.
#[must_use]
pub fn parse_chunk_filename(filename: &str) -> Option<(u64, usize, u32)> {
    let stem = filename.strip_suffix(".wav")?;
    let mut parts = stem.split('_');
    if parts.next()? != "chunk" {
        return None;
    }
    let sequence: u64 = parts.next()?.parse().ok()?;
    if parts.next()? != "prompt" {
        return None;
    }
    let prompt_index: usize = parts.next()?.parse().ok()?;
    let duration_secs: u32 = parts.next()?.strip_suffix('s')?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((sequence, prompt_index, duration_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_round_trips() {
        let name = chunk_filename(42, 3, 60);
        assert_eq!(name, "chunk_000042_prompt_3_60s.wav");
        assert_eq!(parse_chunk_filename(&name), Some((42, 3, 60)));
    }

    #[test]
    fn filename_survives_wide_sequences() {
        // Sequences wider than the padding still parse.
        let name = chunk_filename(10_000_000, 9, 30);
        assert_eq!(parse_chunk_filename(&name), Some((10_000_000, 9, 30)));
    }

    #[test]
    fn parse_rejects_foreign_files() {
        assert_eq!(parse_chunk_filename("buffer_metadata.json"), None);
        assert_eq!(parse_chunk_filename("chunk_001_prompt_0_60s.mp3"), None);
        assert_eq!(parse_chunk_filename("chunk_abc_prompt_0_60s.wav"), None);
        assert_eq!(parse_chunk_filename("chunk_001_prompt_0_60s_extra.wav"), None);
        assert_eq!(parse_chunk_filename("chunk_001_prompt_0_60.wav"), None);
    }

    #[test]
    fn consumed_is_reflected_in_is_available() {
        let mut record = ChunkRecord {
            sequence: 1,
            filename: chunk_filename(1, 0, 60),
            prompt_index: 0,
            duration_secs: 60,
            created_at: Utc::now(),
            consumed_at: None,
            status: ChunkStatus::Available,
        };
        assert!(record.is_available());
        record.status = ChunkStatus::Consumed;
        record.consumed_at = Some(Utc::now());
        assert!(!record.is_available());
    }
}
