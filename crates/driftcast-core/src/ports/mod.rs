//! Port traits for external collaborators and persistence.
//!
//! The producer and consumer loops only ever touch these traits; concrete
//! substrates (filesystem store, synthesis backend, delivery encoder,
//! stitching tool) are injected at the composition root.

pub mod chunk_store;
pub mod delivery;
pub mod stitcher;
pub mod synthesis;

pub use chunk_store::{ChunkStore, StoreError};
pub use delivery::{DeliveryError, DeliverySink};
pub use stitcher::{SelectionStrategy, StitchError, Stitcher};
pub use synthesis::{SynthesisError, Synthesizer};
