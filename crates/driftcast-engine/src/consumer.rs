//! The consumer loop.
//!
//! Streams committed chunks downstream strictly in sequence order. Before a
//! chunk whose prompt differs from the previously delivered one, a short
//! silence unit is sent so the style change does not land as an abrupt cut.
//! A chunk only becomes `Consumed` after the sink accepted it; the cursor
//! update follows, so a crash between the two costs at most one redundant
//! break decision, never a skipped chunk.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driftcast_core::config::BufferConfig;
use driftcast_core::domain::prompts::needs_break;
use driftcast_core::ports::chunk_store::ChunkStore;
use driftcast_core::ports::delivery::{DeliveryError, DeliverySink};

use crate::error::EngineError;

/// What one consumer cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerTick {
    /// A chunk was streamed and marked consumed.
    Delivered { sequence: u64, inserted_break: bool },
    /// Delivery is paused: the buffer is depleted (or empty) and the
    /// producer needs room to rebuild runway.
    Halted,
}

/// Raw 16-bit mono PCM silence for one break unit.
#[must_use]
pub fn silence_pcm(sample_rate: u32, duration_secs: u32) -> Vec<u8> {
    vec![0u8; (sample_rate as usize) * (duration_secs as usize) * 2]
}

/// Continuous chunk consumer.
pub struct Consumer<S, D> {
    store: Arc<S>,
    sink: Arc<D>,
    config: BufferConfig,
}

impl<S: ChunkStore, D: DeliverySink> Consumer<S, D> {
    pub fn new(store: Arc<S>, sink: Arc<D>, config: BufferConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// Deliver one unit with bounded retries. A closed channel is never
    /// retried; the encoder is gone and only a restart can bring it back.
    async fn deliver_with_retries(
        &self,
        audio: &[u8],
        is_break_unit: bool,
    ) -> Result<(), EngineError> {
        let max_attempts = self.config.max_delivery_attempts;
        let mut attempt = 1;
        loop {
            match self.sink.deliver(audio, is_break_unit).await {
                Ok(()) => return Ok(()),
                Err(e @ DeliveryError::Closed) => {
                    return Err(EngineError::DeliveryExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) if attempt < max_attempts => {
                    warn!(attempt, max_attempts, error = %e, "delivery failed, retrying");
                    tokio::time::sleep(Duration::from_secs(self.config.retry_backoff_secs)).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(EngineError::DeliveryExhausted {
                        attempts: max_attempts,
                        source: e,
                    });
                }
            }
        }
    }

    /// One consumption cycle.
    pub async fn tick(&self) -> Result<ConsumerTick, EngineError> {
        let stats = self.store.stats().await?;
        let reading = self
            .config
            .thresholds
            .evaluate(stats.unconsumed_duration_secs);
        if reading.state.halts_delivery() {
            debug!(
                unconsumed = stats.unconsumed,
                "delivery halted while the buffer recovers"
            );
            return Ok(ConsumerTick::Halted);
        }

        let Some(record) = self.store.next_unconsumed().await? else {
            return Ok(ConsumerTick::Halted);
        };

        let last_prompt = self.store.last_streamed_prompt().await?;
        let inserted_break = needs_break(last_prompt, record.prompt_index);
        if inserted_break {
            debug!(
                from = ?last_prompt,
                to = record.prompt_index,
                "prompt boundary, inserting break silence"
            );
            let silence = silence_pcm(self.config.sample_rate, self.config.break_duration_secs);
            self.deliver_with_retries(&silence, true).await?;
        }

        let payload = self.store.read_payload(record.sequence).await?;
        self.deliver_with_retries(&payload, false).await?;

        // Consumed only after the sink accepted the chunk.
        self.store.mark_consumed(record.sequence).await?;
        self.store
            .set_last_streamed_prompt(record.prompt_index)
            .await?;

        info!(
            sequence = record.sequence,
            prompt_index = record.prompt_index,
            inserted_break,
            "chunk delivered"
        );
        Ok(ConsumerTick::Delivered {
            sequence: record.sequence,
            inserted_break,
        })
    }

    /// Run the consumption loop until cancelled. The sink's own
    /// backpressure paces delivery; the loop only sleeps when halted.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), EngineError> {
        info!("consumer loop started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.tick().await? {
                ConsumerTick::Delivered { .. } => {}
                ConsumerTick::Halted => {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(
                            Duration::from_secs(self.config.poll_interval_secs),
                        ) => {}
                    }
                }
            }
        }
        info!("consumer loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use driftcast_core::domain::chunk::NewChunk;
    use driftcast_core::domain::health::HealthThresholds;
    use mockall::mock;
    use mockall::Sequence;
    use tempfile::tempdir;

    use driftcast_store::FsChunkStore;

    mock! {
        pub Sink {}

        #[async_trait]
        impl DeliverySink for Sink {
            async fn deliver(
                &self,
                audio: &[u8],
                is_break_unit: bool,
            ) -> Result<(), DeliveryError>;
        }
    }

    /// Thresholds in single-digit seconds so a few 60s test chunks count as
    /// a healthy buffer.
    fn tiny_thresholds() -> HealthThresholds {
        HealthThresholds {
            healthy_secs: 40,
            warning_secs: 30,
            critical_secs: 20,
            emergency_secs: 10,
            ..HealthThresholds::default()
        }
    }

    fn fast_config() -> BufferConfig {
        BufferConfig {
            chunk_duration_secs: 60,
            prompt_duration_secs: 120,
            prompts: vec!["calm".into(), "dreamy".into(), "hazy".into()],
            thresholds: tiny_thresholds(),
            retry_backoff_secs: 0,
            break_duration_secs: 1,
            sample_rate: 8,
            ..BufferConfig::default()
        }
    }

    async fn seeded_store(
        dir: &tempfile::TempDir,
        config: &BufferConfig,
        prompt_indices: &[usize],
    ) -> Arc<FsChunkStore> {
        let (store, _) = FsChunkStore::open(dir.path(), config).await.unwrap();
        for &prompt_index in prompt_indices {
            store
                .append_chunk(NewChunk {
                    prompt_index,
                    duration_secs: 60,
                    payload: vec![0xAB; 4],
                })
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn delivers_in_order_with_break_at_prompt_boundary() {
        let dir = tempdir().unwrap();
        let config = fast_config();
        let store = seeded_store(&dir, &config, &[0, 0, 1]).await;

        let mut sink = MockSink::new();
        let mut order = Sequence::new();
        // First session: no break before the very first chunk.
        sink.expect_deliver()
            .withf(|_, is_break| !*is_break)
            .times(2)
            .in_sequence(&mut order)
            .returning(|_, _| Ok(()));
        // Prompt 0 -> 1: break silence, then the chunk.
        sink.expect_deliver()
            .withf(|audio, is_break| *is_break && audio.iter().all(|&b| b == 0))
            .times(1)
            .in_sequence(&mut order)
            .returning(|_, _| Ok(()));
        sink.expect_deliver()
            .withf(|_, is_break| !*is_break)
            .times(1)
            .in_sequence(&mut order)
            .returning(|_, _| Ok(()));

        let consumer = Consumer::new(Arc::clone(&store), Arc::new(sink), config);
        assert_eq!(
            consumer.tick().await.unwrap(),
            ConsumerTick::Delivered {
                sequence: 1,
                inserted_break: false
            }
        );
        assert_eq!(
            consumer.tick().await.unwrap(),
            ConsumerTick::Delivered {
                sequence: 2,
                inserted_break: false
            }
        );
        assert_eq!(
            consumer.tick().await.unwrap(),
            ConsumerTick::Delivered {
                sequence: 3,
                inserted_break: true
            }
        );
    }

    #[tokio::test]
    async fn break_decision_survives_a_consumer_restart() {
        let dir = tempdir().unwrap();
        let config = fast_config();
        let store = seeded_store(&dir, &config, &[0, 1]).await;

        let mut first_sink = MockSink::new();
        first_sink
            .expect_deliver()
            .times(1)
            .returning(|_, _| Ok(()));
        let consumer = Consumer::new(Arc::clone(&store), Arc::new(first_sink), config.clone());
        consumer.tick().await.unwrap();
        drop(consumer);

        // A fresh consumer still knows prompt 0 was last on air, so the
        // prompt 1 chunk gets its break.
        let mut second_sink = MockSink::new();
        let mut order = Sequence::new();
        second_sink
            .expect_deliver()
            .withf(|_, is_break| *is_break)
            .times(1)
            .in_sequence(&mut order)
            .returning(|_, _| Ok(()));
        second_sink
            .expect_deliver()
            .withf(|_, is_break| !*is_break)
            .times(1)
            .in_sequence(&mut order)
            .returning(|_, _| Ok(()));
        let consumer = Consumer::new(Arc::clone(&store), Arc::new(second_sink), config);
        assert_eq!(
            consumer.tick().await.unwrap(),
            ConsumerTick::Delivered {
                sequence: 2,
                inserted_break: true
            }
        );
    }

    #[tokio::test]
    async fn depleted_buffer_halts_delivery() {
        let dir = tempdir().unwrap();
        // Default thresholds: one 60s chunk is deep in depletion.
        let config = BufferConfig {
            chunk_duration_secs: 60,
            prompt_duration_secs: 120,
            prompts: vec!["calm".into()],
            ..BufferConfig::default()
        };
        let store = seeded_store(&dir, &config, &[0]).await;

        // Sink must not be touched while halted.
        let sink = MockSink::new();
        let consumer = Consumer::new(Arc::clone(&store), Arc::new(sink), config);
        assert_eq!(consumer.tick().await.unwrap(), ConsumerTick::Halted);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.unconsumed, 1);
    }

    #[tokio::test]
    async fn transient_delivery_failure_is_retried() {
        let dir = tempdir().unwrap();
        let config = fast_config();
        let store = seeded_store(&dir, &config, &[0]).await;

        let mut sink = MockSink::new();
        let mut failures = 1;
        sink.expect_deliver().times(2).returning(move |_, _| {
            if failures > 0 {
                failures -= 1;
                Err(DeliveryError::Backend("encoder hiccup".into()))
            } else {
                Ok(())
            }
        });

        let consumer = Consumer::new(Arc::clone(&store), Arc::new(sink), config);
        assert!(matches!(
            consumer.tick().await.unwrap(),
            ConsumerTick::Delivered { sequence: 1, .. }
        ));
        assert_eq!(store.stats().await.unwrap().total_consumed, 1);
    }

    #[tokio::test]
    async fn exhausted_delivery_leaves_the_chunk_available() {
        let dir = tempdir().unwrap();
        let config = BufferConfig {
            max_delivery_attempts: 2,
            ..fast_config()
        };
        let store = seeded_store(&dir, &config, &[0]).await;

        let mut sink = MockSink::new();
        sink.expect_deliver()
            .times(2)
            .returning(|_, _| Err(DeliveryError::Backend("refused".into())));

        let consumer = Consumer::new(Arc::clone(&store), Arc::new(sink), config);
        let err = consumer.tick().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::DeliveryExhausted { attempts: 2, .. }
        ));

        // Still the head of the queue for the next attempt.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.unconsumed, 1);
        assert_eq!(stats.total_consumed, 0);
    }

    #[tokio::test]
    async fn closed_channel_is_not_retried() {
        let dir = tempdir().unwrap();
        let config = fast_config();
        let store = seeded_store(&dir, &config, &[0]).await;

        let mut sink = MockSink::new();
        sink.expect_deliver()
            .times(1)
            .returning(|_, _| Err(DeliveryError::Closed));

        let consumer = Consumer::new(Arc::clone(&store), Arc::new(sink), config);
        let err = consumer.tick().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::DeliveryExhausted {
                attempts: 1,
                source: DeliveryError::Closed
            }
        ));
    }

    #[test]
    fn silence_matches_pcm_geometry() {
        // 16-bit mono: two bytes per sample.
        assert_eq!(silence_pcm(32_000, 3).len(), 192_000);
        assert!(silence_pcm(8, 1).iter().all(|&b| b == 0));
    }
}
