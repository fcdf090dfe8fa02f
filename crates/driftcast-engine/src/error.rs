use thiserror::Error;

use driftcast_core::ports::chunk_store::StoreError;
use driftcast_core::ports::delivery::DeliveryError;
use driftcast_core::ports::stitcher::StitchError;
use driftcast_core::ports::synthesis::SynthesisError;

/// Errors surfaced by the runtime loops. A loop returning one of these has
/// given up on its current unit of work; the orchestrator decides whether
/// to restart it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Synthesis kept failing past the configured attempt limit. The
    /// sequence counter was never advanced.
    #[error("synthesis failed after {attempts} attempts: {source}")]
    SynthesisExhausted {
        attempts: u32,
        #[source]
        source: SynthesisError,
    },

    /// Delivery of one unit kept failing past the configured attempt limit.
    /// The chunk stays `Available` and will be retried as the head of the
    /// queue after a restart.
    #[error("delivery failed after {attempts} attempts: {source}")]
    DeliveryExhausted {
        attempts: u32,
        #[source]
        source: DeliveryError,
    },

    #[error(transparent)]
    Stitch(#[from] StitchError),

    /// The session runner requires the quota capacity policy.
    #[error("session production requires the quota_accumulate capacity policy")]
    NotQuotaPolicy,
}
