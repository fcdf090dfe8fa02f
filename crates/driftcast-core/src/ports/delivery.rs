//! Delivery port definition.

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the delivery collaborator.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The downstream encoder/stream rejected or dropped the unit.
    #[error("delivery failed: {0}")]
    Backend(String),

    /// The delivery channel is gone (encoder exited, pipe closed).
    #[error("delivery channel closed")]
    Closed,

    #[error("delivery I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for the live delivery encoder.
///
/// Units must be handed over strictly in sequence order; the consumer loop
/// never skips or reorders. Break units are short silences inserted at
/// prompt boundaries.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver one audio unit downstream.
    async fn deliver(&self, audio: &[u8], is_break_unit: bool) -> Result<(), DeliveryError>;
}
