//! The driftcast runtime loops.
//!
//! Three long-running actors, all coordinating exclusively through the
//! [`driftcast_core::ChunkStore`] port:
//!
//! - the producer synthesizes chunks whenever health allows and commits
//!   them durably;
//! - the consumer streams committed chunks downstream in sequence order,
//!   inserting break silence at prompt boundaries;
//! - the session runner produces bounded batches against a weekly quota
//!   (the content-library variant) instead of running continuously.
//!
//! The orchestrator supervises the continuous pair, restarting a crashed
//! loop without touching its sibling.

pub mod consumer;
pub mod error;
pub mod orchestrator;
pub mod producer;
pub mod session;

pub use consumer::{Consumer, ConsumerTick};
pub use error::EngineError;
pub use orchestrator::Orchestrator;
pub use producer::Producer;
pub use session::SessionRunner;
