//! Metadata reconstruction from the on-disk chunk set.
//!
//! When the sidecar document is missing or corrupt, the record set is
//! rebuilt by scanning payload filenames. The true consumption cursor is
//! unrecoverable from the filesystem alone, so every recovered record comes
//! back `Available` — a documented degradation, logged loudly rather than
//! hidden.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::warn;

use driftcast_core::domain::chunk::{ChunkRecord, ChunkStatus, parse_chunk_filename};
use driftcast_core::ports::chunk_store::StoreError;

use crate::metadata::MetadataDocument;

/// Report of a startup recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// True when the document had to be rebuilt from payloads (consumption
    /// state lost).
    pub rebuilt: bool,
    /// Records in the store after the pass.
    pub recovered: usize,
    /// Files that looked like chunks but could not be parsed, or collided
    /// on a sequence number; skipped.
    pub skipped_files: usize,
    /// Recovered chunks whose embedded prompt index disagrees with the
    /// rotation formula. Breaks may be missing at those boundaries.
    pub prompt_mismatches: usize,
}

/// Rebuild a metadata document by scanning `root` for chunk payloads.
///
/// Each payload's sequence, prompt index, and duration are parsed from its
/// filename; the creation timestamp falls back to the file's mtime. Prompt
/// alignment against `chunks_per_prompt`/`prompt_count` is validated and
/// mismatches are logged (they can cost break insertions at prompt
/// boundaries) but the file's own prompt index wins.
pub fn rebuild_from_payloads(
    root: &Path,
    chunks_per_prompt: u64,
    prompt_count: usize,
) -> Result<(MetadataDocument, RecoveryReport), StoreError> {
    let mut records: Vec<ChunkRecord> = Vec::new();
    let mut skipped_files = 0usize;

    let entries = fs::read_dir(root).map_err(|e| StoreError::io(root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(root, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with("chunk_") || !name.ends_with(".wav") {
            continue;
        }
        let Some((sequence, prompt_index, duration_secs)) = parse_chunk_filename(name) else {
            warn!(file = name, "unparseable chunk filename, skipping");
            skipped_files += 1;
            continue;
        };
        let created_at = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
        records.push(ChunkRecord {
            sequence,
            filename: name.to_string(),
            prompt_index,
            duration_secs,
            created_at,
            consumed_at: None,
            status: ChunkStatus::Available,
        });
    }

    records.sort_by_key(|r| r.sequence);

    // Drop sequence collisions (two files claiming one sequence); the first
    // by directory order wins.
    let mut deduped: Vec<ChunkRecord> = Vec::with_capacity(records.len());
    for record in records {
        if deduped.last().is_some_and(|prev| prev.sequence == record.sequence) {
            warn!(
                sequence = record.sequence,
                file = %record.filename,
                "duplicate sequence number on disk, skipping"
            );
            skipped_files += 1;
            continue;
        }
        deduped.push(record);
    }

    let mut prompt_mismatches = 0usize;
    if chunks_per_prompt > 0 && prompt_count > 0 {
        for record in &deduped {
            let ordinal = record.sequence.saturating_sub(1);
            #[allow(clippy::cast_possible_truncation)]
            let expected = ((ordinal / chunks_per_prompt) % prompt_count as u64) as usize;
            if record.prompt_index != expected {
                warn!(
                    sequence = record.sequence,
                    file_prompt = record.prompt_index,
                    expected_prompt = expected,
                    "prompt alignment mismatch; a break boundary may be missing"
                );
                prompt_mismatches += 1;
            }
        }
    }

    let next_sequence = deduped.last().map_or(1, |r| r.sequence + 1);
    let recovered = deduped.len();

    let doc = MetadataDocument {
        next_sequence,
        chunks: deduped,
        ..MetadataDocument::empty()
    };
    let report = RecoveryReport {
        rebuilt: true,
        recovered,
        skipped_files,
        prompt_mismatches,
    };
    Ok((doc, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftcast_core::domain::chunk::chunk_filename;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"pcm").unwrap();
    }

    #[test]
    fn rebuilds_sorted_all_available() {
        let dir = tempdir().unwrap();
        // Written out of order on purpose.
        touch(dir.path(), &chunk_filename(3, 1, 60));
        touch(dir.path(), &chunk_filename(1, 0, 60));
        touch(dir.path(), &chunk_filename(2, 0, 60));
        touch(dir.path(), "buffer_metadata.json"); // not a chunk

        let (doc, report) = rebuild_from_payloads(dir.path(), 2, 3).unwrap();

        let sequences: Vec<u64> = doc.chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(doc.chunks.iter().all(ChunkRecord::is_available));
        assert_eq!(doc.next_sequence, 4);
        assert_eq!(report.recovered, 3);
        assert_eq!(report.skipped_files, 0);
        assert_eq!(report.prompt_mismatches, 0);
        assert!(report.rebuilt);
    }

    #[test]
    fn skips_unparseable_and_counts_them() {
        let dir = tempdir().unwrap();
        touch(dir.path(), &chunk_filename(1, 0, 60));
        touch(dir.path(), "chunk_garbage.wav");

        let (doc, report) = rebuild_from_payloads(dir.path(), 2, 3).unwrap();
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(report.skipped_files, 1);
    }

    #[test]
    fn flags_prompt_misalignment() {
        let dir = tempdir().unwrap();
        // Sequence 3 with chunks_per_prompt=2 should carry prompt 1.
        touch(dir.path(), &chunk_filename(3, 2, 60));

        let (_, report) = rebuild_from_payloads(dir.path(), 2, 3).unwrap();
        assert_eq!(report.prompt_mismatches, 1);
    }

    #[test]
    fn empty_directory_yields_fresh_document() {
        let dir = tempdir().unwrap();
        let (doc, report) = rebuild_from_payloads(dir.path(), 2, 3).unwrap();
        assert!(doc.chunks.is_empty());
        assert_eq!(doc.next_sequence, 1);
        assert_eq!(report.recovered, 0);
    }
}
