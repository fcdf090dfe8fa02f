//! Scheduled session production (content-library variant).
//!
//! Instead of a continuous loop, production runs in fixed-size batches
//! fired by an external scheduler, counted against a weekly quota. Progress
//! is keyed by ISO week and persisted after every chunk, so a re-triggered
//! or crashed session resumes exactly where it left off and a met quota
//! makes further triggers no-ops.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use driftcast_core::config::{BufferConfig, CapacityPolicy};
use driftcast_core::domain::chunk::NewChunk;
use driftcast_core::domain::prompts::PromptTable;
use driftcast_core::domain::session::{SessionOutcome, SessionProgress, WeeklyProgress, week_id_for};
use driftcast_core::ports::chunk_store::ChunkStore;
use driftcast_core::ports::stitcher::{SelectionStrategy, Stitcher};
use driftcast_core::ports::synthesis::Synthesizer;

use crate::error::EngineError;
use crate::producer::synthesize_with_backoff;

/// Pick `count` sources out of an ordered library.
///
/// `Spread` takes evenly spaced picks across the whole set, preserving
/// sequence order, so a stitched segment samples the library's full range
/// instead of its oldest corner.
#[must_use]
pub fn select_sources(
    paths: &[PathBuf],
    count: usize,
    strategy: SelectionStrategy,
) -> Vec<PathBuf> {
    if count >= paths.len() {
        return paths.to_vec();
    }
    match strategy {
        SelectionStrategy::Sequential => paths[..count].to_vec(),
        SelectionStrategy::Spread => (0..count)
            .map(|i| paths[i * paths.len() / count].clone())
            .collect(),
    }
}

/// Quota-driven batch producer.
pub struct SessionRunner<S, Y> {
    store: Arc<S>,
    synthesizer: Arc<Y>,
    config: BufferConfig,
    prompts: PromptTable,
    weekly_target: u32,
    session_size: u32,
}

impl<S: ChunkStore, Y: Synthesizer> SessionRunner<S, Y> {
    /// Build a runner. Fails unless the configured capacity policy is
    /// quota-based.
    pub fn new(
        store: Arc<S>,
        synthesizer: Arc<Y>,
        config: BufferConfig,
    ) -> Result<Self, EngineError> {
        let CapacityPolicy::QuotaAccumulate {
            weekly_target,
            session_size,
        } = config.capacity
        else {
            return Err(EngineError::NotQuotaPolicy);
        };
        let prompts = config.prompt_table();
        Ok(Self {
            store,
            synthesizer,
            config,
            prompts,
            weekly_target,
            session_size,
        })
    }

    /// Load persisted progress, rolling it over to a fresh record when the
    /// stored week is not the week `now` falls in.
    async fn current_progress(&self, now: DateTime<Utc>) -> Result<SessionProgress, EngineError> {
        let week_id = week_id_for(now);
        match self.store.session_progress().await? {
            Some(progress) if progress.week_id == week_id => Ok(progress),
            stale => {
                if let Some(old) = stale {
                    info!(
                        from_week = %old.week_id,
                        to_week = %week_id,
                        "week rolled over, resetting session progress"
                    );
                }
                Ok(SessionProgress::new(week_id, self.weekly_target))
            }
        }
    }

    /// Run one session batch. The week is fixed from `now` (the session's
    /// start), so a batch straddling a week boundary stays in its week.
    pub async fn run_session(&self, now: DateTime<Utc>) -> Result<SessionOutcome, EngineError> {
        let mut progress = self.current_progress(now).await?;
        if progress.is_met() {
            info!(
                week = %progress.week_id,
                produced = progress.produced_this_week,
                "weekly quota already met, nothing to do"
            );
            return Ok(SessionOutcome::QuotaMet {
                week_id: progress.week_id,
            });
        }

        let batch = self.session_size.min(progress.remaining());
        info!(
            week = %progress.week_id,
            batch,
            remaining = progress.remaining(),
            "session started"
        );

        for n in 0..batch {
            let sequence = self.store.next_sequence().await;
            let prompt_index = self.prompts.prompt_index_of(sequence);
            let prompt = self.prompts.text_for_sequence(sequence);
            debug!(sequence, prompt_index, n, batch, "synthesizing session chunk");

            let payload = synthesize_with_backoff(
                self.synthesizer.as_ref(),
                prompt,
                self.config.chunk_duration_secs,
                self.config.max_synthesis_attempts,
                self.config.retry_backoff_secs,
            )
            .await?;

            self.store
                .append_chunk(NewChunk {
                    prompt_index,
                    duration_secs: self.config.chunk_duration_secs,
                    payload,
                })
                .await?;

            // Persist after every chunk; a crash mid-batch loses nothing.
            progress.produced_this_week += 1;
            self.store.set_session_progress(progress.clone()).await?;
        }

        info!(
            week = %progress.week_id,
            produced = batch,
            remaining = progress.remaining(),
            "session finished"
        );
        let remaining = progress.remaining();
        Ok(SessionOutcome::Produced {
            week_id: progress.week_id,
            produced: batch,
            remaining,
        })
    }

    /// Operator-facing weekly report. Reads only; a week rollover shows as
    /// fresh progress without being persisted.
    pub async fn weekly_progress(&self, now: DateTime<Utc>) -> Result<WeeklyProgress, EngineError> {
        let progress = self.current_progress(now).await?;
        Ok(WeeklyProgress::from_progress(&progress, self.session_size))
    }

    /// Stitch `count` library chunks into one long-form segment.
    pub async fn create_segment<T: Stitcher>(
        &self,
        stitcher: &T,
        count: usize,
        strategy: SelectionStrategy,
        output: &Path,
    ) -> Result<PathBuf, EngineError> {
        let paths = self.store.payload_paths().await?;
        let sources = select_sources(&paths, count, strategy);
        info!(
            selected = sources.len(),
            library = paths.len(),
            output = %output.display(),
            "stitching segment"
        );
        let artifact = stitcher.stitch(&sources, output).await?;
        Ok(artifact)
    }
}
