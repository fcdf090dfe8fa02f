//! Supervision of the continuous producer/consumer pair.
//!
//! Each loop runs in its own task. A crashed loop is restarted after a
//! short delay without disturbing its sibling; because all state lives in
//! the durable store, a restarted loop picks up exactly where the dead one
//! stopped. A periodic heartbeat logs buffer statistics and the current
//! health state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use driftcast_core::config::BufferConfig;
use driftcast_core::ports::chunk_store::ChunkStore;
use driftcast_core::ports::delivery::DeliverySink;
use driftcast_core::ports::synthesis::Synthesizer;

use crate::consumer::Consumer;
use crate::error::EngineError;
use crate::producer::Producer;

/// Delay before restarting a crashed loop.
const RESTART_DELAY_SECS: u64 = 10;

/// Heartbeat logging interval.
const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Restart a loop body until cancellation.
async fn supervise<F, Fut>(task: &'static str, cancel: CancellationToken, run: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), EngineError>>,
{
    loop {
        match run().await {
            Ok(()) => break,
            Err(e) => {
                if cancel.is_cancelled() {
                    break;
                }
                error!(task, error = %e, "loop failed, restarting");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_secs(RESTART_DELAY_SECS)) => {}
                }
            }
        }
    }
    info!(task, "supervision ended");
}

/// Runs the producer and consumer side by side under supervision.
pub struct Orchestrator<S, Y, D> {
    store: Arc<S>,
    producer: Arc<Producer<S, Y>>,
    consumer: Arc<Consumer<S, D>>,
    config: BufferConfig,
}

impl<S, Y, D> Orchestrator<S, Y, D>
where
    S: ChunkStore + 'static,
    Y: Synthesizer + 'static,
    D: DeliverySink + 'static,
{
    pub fn new(
        store: Arc<S>,
        synthesizer: Arc<Y>,
        sink: Arc<D>,
        config: BufferConfig,
    ) -> Self {
        let producer = Arc::new(Producer::new(
            Arc::clone(&store),
            synthesizer,
            config.clone(),
        ));
        let consumer = Arc::new(Consumer::new(Arc::clone(&store), sink, config.clone()));
        Self {
            store,
            producer,
            consumer,
            config,
        }
    }

    /// Run both loops until `cancel` fires, then wait for a clean stop.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), EngineError> {
        info!("orchestrator started");
        let loops = cancel.child_token();

        let producer = Arc::clone(&self.producer);
        let producer_cancel = loops.clone();
        let producer_task = tokio::spawn(async move {
            let inner = producer_cancel.clone();
            supervise("producer", producer_cancel, move || {
                let producer = Arc::clone(&producer);
                let cancel = inner.clone();
                async move { producer.run(cancel).await }
            })
            .await;
        });

        let consumer = Arc::clone(&self.consumer);
        let consumer_cancel = loops.clone();
        let consumer_task = tokio::spawn(async move {
            let inner = consumer_cancel.clone();
            supervise("consumer", consumer_cancel, move || {
                let consumer = Arc::clone(&consumer);
                let cancel = inner.clone();
                async move { consumer.run(cancel).await }
            })
            .await;
        });

        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = heartbeat.tick() => self.log_heartbeat().await,
            }
        }

        info!("shutdown requested, stopping loops");
        loops.cancel();
        let _ = tokio::join!(producer_task, consumer_task);
        info!("orchestrator stopped");
        Ok(())
    }

    async fn log_heartbeat(&self) {
        match self.store.stats().await {
            Ok(stats) => {
                let reading = self
                    .config
                    .thresholds
                    .evaluate(stats.unconsumed_duration_secs);
                info!(
                    health = %reading.state,
                    unconsumed = stats.unconsumed,
                    unconsumed_secs = stats.unconsumed_duration_secs,
                    total = stats.total,
                    total_consumed = stats.total_consumed,
                    "heartbeat"
                );
            }
            Err(e) => warn!(error = %e, "heartbeat stats unavailable"),
        }
    }
}
