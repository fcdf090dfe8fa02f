//! The JSON sidecar metadata document and its atomic write path.
//!
//! The document is the single committed source of truth for the record set.
//! Every mutation rewrites it through a temp file + fsync + rename, so a
//! crash leaves either the old or the new document, never a torn one.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use driftcast_core::domain::chunk::ChunkRecord;
use driftcast_core::domain::session::SessionProgress;
use driftcast_core::ports::chunk_store::StoreError;

/// Sidecar document name inside the buffer directory.
pub const METADATA_FILENAME: &str = "buffer_metadata.json";

/// Current document schema version.
pub const METADATA_VERSION: u32 = 1;

/// On-disk shape of the buffer metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub version: u32,
    /// Next sequence number to issue; one past the highest ever issued.
    pub next_sequence: u64,
    /// Prompt index of the most recently delivered chunk.
    pub last_streamed_prompt: Option<usize>,
    /// Lifetime consumption counter; survives eviction.
    pub total_consumed: u64,
    /// Weekly session progress (library variant).
    pub session: Option<SessionProgress>,
    /// Record list, ordered by sequence.
    pub chunks: Vec<ChunkRecord>,
}

impl MetadataDocument {
    /// A fresh document for an empty buffer.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            version: METADATA_VERSION,
            next_sequence: 1,
            last_streamed_prompt: None,
            total_consumed: 0,
            session: None,
            chunks: Vec::new(),
        }
    }
}

/// What loading the sidecar produced.
#[derive(Debug)]
pub enum LoadOutcome {
    /// Parsed cleanly.
    Loaded(MetadataDocument),
    /// No document on disk (first run, or wiped).
    Missing,
    /// Present but unusable; the reason is kept for the degradation log.
    Corrupt(String),
}

/// Load the metadata document. Parse failures are reported as
/// [`LoadOutcome::Corrupt`] rather than errors so the caller can run
/// recovery; only I/O failures propagate.
pub fn load(path: &Path) -> Result<LoadOutcome, StoreError> {
    if !path.exists() {
        return Ok(LoadOutcome::Missing);
    }
    let raw = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    match serde_json::from_str::<MetadataDocument>(&raw) {
        Ok(doc) if doc.version == METADATA_VERSION => Ok(LoadOutcome::Loaded(doc)),
        Ok(doc) => Ok(LoadOutcome::Corrupt(format!(
            "unsupported metadata version {}",
            doc.version
        ))),
        Err(e) => Ok(LoadOutcome::Corrupt(e.to_string())),
    }
}

/// Atomically replace the metadata document: write to a temp file in the
/// same directory, fsync, rename over the target.
pub fn save_atomic(path: &Path, doc: &MetadataDocument) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let serialized = serde_json::to_vec_pretty(doc)?;

    let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(&serialized)
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Atomically write a chunk payload next to its final location.
pub fn write_payload_atomic(dir: &Path, filename: &str, payload: &[u8]) -> Result<(), StoreError> {
    let tmp = dir.join(format!(".tmp_{filename}"));
    let target = dir.join(filename);

    let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(payload).map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, &target).map_err(|e| StoreError::io(&target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);

        let doc = MetadataDocument::empty();
        save_atomic(&path, &doc).unwrap();

        match load(&path).unwrap() {
            LoadOutcome::Loaded(back) => assert_eq!(back, doc),
            other => panic!("expected Loaded, got {other:?}"),
        }
        // No temp file left behind.
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_document_reports_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        assert!(matches!(load(&path).unwrap(), LoadOutcome::Missing));
    }

    #[test]
    fn garbage_reports_corrupt_not_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(load(&path).unwrap(), LoadOutcome::Corrupt(_)));
    }

    #[test]
    fn future_version_reports_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(METADATA_FILENAME);
        let mut doc = MetadataDocument::empty();
        doc.version = 99;
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        assert!(matches!(load(&path).unwrap(), LoadOutcome::Corrupt(_)));
    }

    #[test]
    fn payload_write_is_atomic_to_final_name() {
        let dir = tempdir().unwrap();
        write_payload_atomic(dir.path(), "chunk_000001_prompt_0_60s.wav", b"pcm").unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("chunk_000001_prompt_0_60s.wav")).unwrap(),
            b"pcm"
        );
        assert!(!dir.path().join(".tmp_chunk_000001_prompt_0_60s.wav").exists());
    }
}
