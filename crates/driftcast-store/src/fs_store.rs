//! `FsChunkStore` — the filesystem implementation of the `ChunkStore` port.
//!
//! In-memory state lives behind one `RwLock`: every mutation (append,
//! mark-consumed, evict, cursor update) takes the write lock, applies the
//! change, and rewrites the sidecar document before releasing it, so
//! concurrent mutations never interleave partially. Read-only queries take
//! a read snapshot and never block each other. Synthesis and delivery run
//! entirely outside these locks.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use driftcast_core::config::{BufferConfig, CapacityPolicy};
use driftcast_core::domain::chunk::{
    AppendOutcome, BufferStats, ChunkRecord, ChunkStatus, NewChunk, chunk_filename,
};
use driftcast_core::domain::session::SessionProgress;
use driftcast_core::ports::chunk_store::{ChunkStore, StoreError};

use crate::metadata::{self, LoadOutcome, METADATA_FILENAME, MetadataDocument};
use crate::recovery::{self, RecoveryReport};

/// In-memory mirror of the metadata document, indexed for O(log n) access
/// to the next unconsumed record.
#[derive(Debug)]
struct StoreState {
    next_sequence: u64,
    last_streamed_prompt: Option<usize>,
    total_consumed: u64,
    session: Option<SessionProgress>,
    chunks: BTreeMap<u64, ChunkRecord>,
    /// Sequence numbers of `Available` records.
    available: BTreeSet<u64>,
    /// Running sum of `Available` durations, kept so `stats()` is O(1).
    unconsumed_duration_secs: u64,
}

impl StoreState {
    fn from_document(doc: MetadataDocument) -> Self {
        let mut chunks = BTreeMap::new();
        let mut available = BTreeSet::new();
        let mut unconsumed_duration_secs = 0u64;
        for record in doc.chunks {
            if record.is_available() {
                available.insert(record.sequence);
                unconsumed_duration_secs += u64::from(record.duration_secs);
            }
            chunks.insert(record.sequence, record);
        }
        Self {
            next_sequence: doc.next_sequence,
            last_streamed_prompt: doc.last_streamed_prompt,
            total_consumed: doc.total_consumed,
            session: doc.session,
            chunks,
            available,
            unconsumed_duration_secs,
        }
    }

    fn to_document(&self) -> MetadataDocument {
        MetadataDocument {
            next_sequence: self.next_sequence,
            last_streamed_prompt: self.last_streamed_prompt,
            total_consumed: self.total_consumed,
            session: self.session.clone(),
            chunks: self.chunks.values().cloned().collect(),
            ..MetadataDocument::empty()
        }
    }

    fn insert(&mut self, record: ChunkRecord) {
        if record.is_available() {
            self.available.insert(record.sequence);
            self.unconsumed_duration_secs += u64::from(record.duration_secs);
        }
        self.chunks.insert(record.sequence, record);
    }

    /// Remove a record from the indexes and return it.
    fn remove(&mut self, sequence: u64) -> Option<ChunkRecord> {
        let record = self.chunks.remove(&sequence)?;
        if self.available.remove(&sequence) {
            self.unconsumed_duration_secs = self
                .unconsumed_duration_secs
                .saturating_sub(u64::from(record.duration_secs));
        }
        Some(record)
    }

    fn stats(&self) -> BufferStats {
        BufferStats {
            total: self.chunks.len(),
            unconsumed: self.available.len(),
            unconsumed_duration_secs: self.unconsumed_duration_secs,
            consumed: self.chunks.len() - self.available.len(),
            total_consumed: self.total_consumed,
        }
    }
}

/// Filesystem-backed chunk store: one payload file per chunk plus a JSON
/// sidecar document, under one buffer directory.
pub struct FsChunkStore {
    root: PathBuf,
    metadata_path: PathBuf,
    policy: CapacityPolicy,
    state: RwLock<StoreState>,
}

impl FsChunkStore {
    /// Open (or create) the store at `root`.
    ///
    /// A missing or corrupt metadata document triggers recovery from the
    /// on-disk payload set; the returned report says whether that happened.
    /// If the fixed-rolling policy finds more records than its capacity
    /// (a crash mid-eviction, or a lowered capacity), the overflow is
    /// evicted here before any loop starts.
    pub async fn open(
        root: impl Into<PathBuf>,
        config: &BufferConfig,
    ) -> Result<(Self, RecoveryReport), StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        sweep_stale_temp_files(&root);

        let metadata_path = root.join(METADATA_FILENAME);
        let (doc, report) = match metadata::load(&metadata_path)? {
            LoadOutcome::Loaded(doc) => {
                let report = RecoveryReport {
                    rebuilt: false,
                    recovered: doc.chunks.len(),
                    ..RecoveryReport::default()
                };
                (doc, report)
            }
            LoadOutcome::Missing => {
                info!(root = %root.display(), "no metadata document, scanning payloads");
                Self::rebuild_document(&root, config)?
            }
            LoadOutcome::Corrupt(reason) => {
                warn!(
                    root = %root.display(),
                    reason,
                    "metadata document corrupt; rebuilding from payloads. \
                     Consumption state is lost and all recovered chunks are \
                     marked available (degraded recovery)"
                );
                Self::rebuild_document(&root, config)?
            }
        };

        let store = Self {
            metadata_path,
            policy: config.capacity.clone(),
            state: RwLock::new(StoreState::from_document(doc)),
            root,
        };

        if report.rebuilt {
            let state = store.state.read().await;
            store.persist(&state)?;
        }
        store.enforce_capacity_on_open().await?;

        Ok((store, report))
    }

    /// Force a rebuild from payloads, discarding any existing metadata
    /// document. Exposed for the operator-facing `recover` command.
    pub async fn rebuild(
        root: impl Into<PathBuf>,
        config: &BufferConfig,
    ) -> Result<(Self, RecoveryReport), StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        sweep_stale_temp_files(&root);

        let (doc, report) = Self::rebuild_document(&root, config)?;
        let metadata_path = root.join(METADATA_FILENAME);
        metadata::save_atomic(&metadata_path, &doc)?;

        let store = Self {
            metadata_path,
            policy: config.capacity.clone(),
            state: RwLock::new(StoreState::from_document(doc)),
            root,
        };
        store.enforce_capacity_on_open().await?;
        Ok((store, report))
    }

    /// Buffer directory this store lives in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn rebuild_document(
        root: &Path,
        config: &BufferConfig,
    ) -> Result<(MetadataDocument, RecoveryReport), StoreError> {
        recovery::rebuild_from_payloads(root, config.chunks_per_prompt(), config.prompts.len())
    }

    fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        metadata::save_atomic(&self.metadata_path, &state.to_document())
    }

    fn payload_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Delete a payload file, best effort. Metadata is authoritative; a
    /// leftover file is re-swept by the next recovery, so failure here is a
    /// warning, not an error.
    fn delete_payload(&self, record: &ChunkRecord) {
        let path = self.payload_path(&record.filename);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    sequence = record.sequence,
                    path = %path.display(),
                    error = %e,
                    "failed to delete evicted payload"
                );
            }
        }
    }

    /// Evict lowest-sequence records while over the fixed-rolling capacity.
    /// Returns the evicted records and whether any were never consumed.
    fn apply_rolling_eviction(
        &self,
        state: &mut StoreState,
        capacity: usize,
    ) -> (Vec<ChunkRecord>, bool) {
        let mut evicted = Vec::new();
        let mut evicted_unconsumed = false;
        while state.chunks.len() > capacity {
            let Some((&sequence, _)) = state.chunks.first_key_value() else {
                break;
            };
            let Some(record) = state.remove(sequence) else {
                break;
            };
            if record.is_available() {
                evicted_unconsumed = true;
                warn!(
                    sequence,
                    prompt_index = record.prompt_index,
                    "evicting chunk that was never streamed; playable runway shrinks"
                );
            } else {
                debug!(sequence, "evicting consumed chunk at capacity bound");
            }
            self.delete_payload(&record);
            evicted.push(record);
        }
        (evicted, evicted_unconsumed)
    }

    /// Drop the oldest consumed records beyond the retention count. Never
    /// touches `Available` records.
    fn apply_consumed_retention(&self, state: &mut StoreState, keep_consumed: usize) {
        let consumed: Vec<u64> = state
            .chunks
            .values()
            .filter(|r| !r.is_available())
            .map(|r| r.sequence)
            .collect();
        if consumed.len() <= keep_consumed {
            return;
        }
        let excess = consumed.len() - keep_consumed;
        for &sequence in consumed.iter().take(excess) {
            if let Some(record) = state.remove(sequence) {
                self.delete_payload(&record);
                debug!(sequence, "purged consumed chunk beyond retention");
            }
        }
    }

    async fn enforce_capacity_on_open(&self) -> Result<(), StoreError> {
        let Some(capacity) = self.policy.capacity() else {
            return Ok(());
        };
        let mut state = self.state.write().await;
        if state.chunks.len() <= capacity {
            return Ok(());
        }
        warn!(
            stored = state.chunks.len(),
            capacity, "store over capacity at open; trimming oldest"
        );
        let _ = self.apply_rolling_eviction(&mut state, capacity);
        self.persist(&state)?;
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for FsChunkStore {
    async fn next_sequence(&self) -> u64 {
        self.state.read().await.next_sequence
    }

    async fn append_chunk(&self, chunk: NewChunk) -> Result<AppendOutcome, StoreError> {
        let mut state = self.state.write().await;

        // The guard must run before anything is written: refusing after the
        // payload landed would leave an orphan.
        if let CapacityPolicy::FixedRolling {
            capacity,
            refuse_unconsumed_eviction: true,
        } = &self.policy
        {
            let overflow = (state.chunks.len() + 1).saturating_sub(*capacity);
            if let Some(victim) = state
                .chunks
                .values()
                .take(overflow)
                .find(|r| r.is_available())
            {
                warn!(
                    sequence = victim.sequence,
                    "append refused: would evict unconsumed content"
                );
                return Err(StoreError::EvictionRefused(victim.sequence));
            }
        }

        let sequence = state.next_sequence;
        let filename = chunk_filename(sequence, chunk.prompt_index, chunk.duration_secs);

        // Payload first, then the metadata commit. A crash in between
        // leaves an orphan payload that the next recovery scan re-adopts;
        // it is never partially visible through the committed document.
        metadata::write_payload_atomic(&self.root, &filename, &chunk.payload)?;

        let record = ChunkRecord {
            sequence,
            filename,
            prompt_index: chunk.prompt_index,
            duration_secs: chunk.duration_secs,
            created_at: Utc::now(),
            consumed_at: None,
            status: ChunkStatus::Available,
        };
        state.insert(record.clone());
        state.next_sequence += 1;

        let (evicted, evicted_unconsumed) = match &self.policy {
            CapacityPolicy::FixedRolling { capacity, .. } => {
                self.apply_rolling_eviction(&mut state, *capacity)
            }
            _ => (Vec::new(), false),
        };

        if let Some(capacity) = self.policy.capacity() {
            let count = state.chunks.len();
            if count > capacity {
                error!(count, capacity, "capacity invariant violated after eviction");
                return Err(StoreError::CapacityInvariant { count, capacity });
            }
        }

        self.persist(&state)?;
        info!(
            sequence,
            prompt_index = record.prompt_index,
            stored = state.chunks.len(),
            "chunk appended"
        );
        Ok(AppendOutcome {
            record,
            evicted,
            evicted_unconsumed,
        })
    }

    async fn next_unconsumed(&self) -> Result<Option<ChunkRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .available
            .first()
            .and_then(|seq| state.chunks.get(seq))
            .cloned())
    }

    async fn mark_consumed(&self, sequence: u64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let Some(record) = state.chunks.get_mut(&sequence) else {
            return Err(StoreError::UnknownSequence(sequence));
        };
        if record.status == ChunkStatus::Consumed {
            // Idempotent: nothing to change, nothing to persist.
            return Ok(());
        }
        record.status = ChunkStatus::Consumed;
        record.consumed_at = Some(Utc::now());
        let duration = u64::from(record.duration_secs);
        state.available.remove(&sequence);
        state.unconsumed_duration_secs = state.unconsumed_duration_secs.saturating_sub(duration);
        state.total_consumed += 1;

        if let CapacityPolicy::UnboundedRetain { keep_consumed } = &self.policy {
            self.apply_consumed_retention(&mut state, *keep_consumed);
        }

        self.persist(&state)?;
        debug!(sequence, "chunk marked consumed");
        Ok(())
    }

    async fn read_payload(&self, sequence: u64) -> Result<Vec<u8>, StoreError> {
        let path = {
            let state = self.state.read().await;
            let record = state
                .chunks
                .get(&sequence)
                .ok_or(StoreError::UnknownSequence(sequence))?;
            self.payload_path(&record.filename)
        };
        tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn payload_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .chunks
            .values()
            .map(|r| self.payload_path(&r.filename))
            .collect())
    }

    async fn stats(&self) -> Result<BufferStats, StoreError> {
        Ok(self.state.read().await.stats())
    }

    async fn last_streamed_prompt(&self) -> Result<Option<usize>, StoreError> {
        Ok(self.state.read().await.last_streamed_prompt)
    }

    async fn set_last_streamed_prompt(&self, index: usize) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.last_streamed_prompt = Some(index);
        self.persist(&state)
    }

    async fn session_progress(&self) -> Result<Option<SessionProgress>, StoreError> {
        Ok(self.state.read().await.session.clone())
    }

    async fn set_session_progress(&self, progress: SessionProgress) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.session = Some(progress);
        self.persist(&state)
    }
}

/// Remove leftovers from writes that crashed between temp write and rename.
fn sweep_stale_temp_files(root: &Path) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(".tmp_") || name.ends_with(".json.tmp") {
            debug!(file = name, "sweeping stale temp file");
            let _ = fs::remove_file(entry.path());
        }
    }
}
