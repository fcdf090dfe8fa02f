//! The producer loop.
//!
//! Each cycle evaluates buffer health, synthesizes one chunk for the prompt
//! the rotation dictates, commits it, then sleeps the cooldown the health
//! state binds. Synthesis runs entirely outside the store's mutation lock;
//! the sequence number is only assigned at commit, so a failed synthesis
//! never burns one.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driftcast_core::config::BufferConfig;
use driftcast_core::domain::chunk::{AppendOutcome, NewChunk};
use driftcast_core::domain::prompts::PromptTable;
use driftcast_core::ports::chunk_store::ChunkStore;
use driftcast_core::ports::synthesis::Synthesizer;

use crate::error::EngineError;

/// Ceiling on the doubling retry backoff.
const MAX_BACKOFF_SECS: u64 = 300;

/// Retry a synthesis call with doubling backoff, up to `max_attempts`.
pub(crate) async fn synthesize_with_backoff<Y: Synthesizer + ?Sized>(
    synthesizer: &Y,
    prompt: &str,
    duration_secs: u32,
    max_attempts: u32,
    backoff_secs: u64,
) -> Result<Vec<u8>, EngineError> {
    let mut backoff = backoff_secs;
    let mut attempt = 1;
    loop {
        match synthesizer.synthesize(prompt, duration_secs).await {
            Ok(payload) => return Ok(payload),
            Err(e) if attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "synthesis failed, retrying");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                attempt += 1;
            }
            Err(e) => {
                return Err(EngineError::SynthesisExhausted {
                    attempts: max_attempts,
                    source: e,
                });
            }
        }
    }
}

/// Continuous chunk producer.
pub struct Producer<S, Y> {
    store: Arc<S>,
    synthesizer: Arc<Y>,
    config: BufferConfig,
    prompts: PromptTable,
}

impl<S: ChunkStore, Y: Synthesizer> Producer<S, Y> {
    pub fn new(store: Arc<S>, synthesizer: Arc<Y>, config: BufferConfig) -> Self {
        let prompts = config.prompt_table();
        Self {
            store,
            synthesizer,
            config,
            prompts,
        }
    }

    /// One production cycle. Returns `None` when health directed the
    /// producer to stand down instead of synthesizing.
    pub async fn produce_one(&self) -> Result<Option<AppendOutcome>, EngineError> {
        let stats = self.store.stats().await?;
        let reading = self
            .config
            .thresholds
            .evaluate(stats.unconsumed_duration_secs);
        if !reading.state.allows_production(stats.unconsumed) {
            warn!(
                health = %reading.state,
                unconsumed = stats.unconsumed,
                "production halted: consumption is outrunning a stalled producer"
            );
            return Ok(None);
        }

        let sequence = self.store.next_sequence().await;
        let prompt_index = self.prompts.prompt_index_of(sequence);
        let prompt = self.prompts.text_for_sequence(sequence);
        debug!(sequence, prompt_index, health = %reading.state, "synthesizing chunk");

        let payload = synthesize_with_backoff(
            self.synthesizer.as_ref(),
            prompt,
            self.config.chunk_duration_secs,
            self.config.max_synthesis_attempts,
            self.config.retry_backoff_secs,
        )
        .await?;

        let outcome = self
            .store
            .append_chunk(NewChunk {
                prompt_index,
                duration_secs: self.config.chunk_duration_secs,
                payload,
            })
            .await?;

        if outcome.evicted_unconsumed {
            warn!(
                sequence = outcome.record.sequence,
                evicted = outcome.evicted.len(),
                "append evicted unconsumed content"
            );
        }
        Ok(Some(outcome))
    }

    /// Run the production loop until cancelled. Propagates only errors the
    /// retry policy could not absorb.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), EngineError> {
        info!("producer loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let wait_secs = match self.produce_one().await? {
                Some(outcome) => {
                    let stats = self.store.stats().await?;
                    let reading = self
                        .config
                        .thresholds
                        .evaluate(stats.unconsumed_duration_secs);
                    info!(
                        sequence = outcome.record.sequence,
                        unconsumed_secs = stats.unconsumed_duration_secs,
                        health = %reading.state,
                        cooldown_secs = reading.cooldown_secs,
                        "chunk produced"
                    );
                    reading.cooldown_secs
                }
                None => self.config.poll_interval_secs,
            };
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(Duration::from_secs(wait_secs)) => {}
            }
        }
        info!("producer loop stopped");
        Ok(())
    }
}
