//! Synthesis port definition.

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the synthesis collaborator.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The backend ran but produced no usable audio (nonzero exit, empty
    /// output, model failure).
    #[error("synthesis backend failed: {0}")]
    Backend(String),

    /// Could not reach or spawn the backend at all.
    #[error("synthesis I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for the audio synthesis model.
///
/// A call is long-running (minutes per chunk) and not preemptible; callers
/// must never hold the store's mutation lock across it.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Produce `duration_secs` of audio for `prompt`, returning the raw
    /// payload bytes.
    async fn synthesize(&self, prompt: &str, duration_secs: u32) -> Result<Vec<u8>, SynthesisError>;
}
