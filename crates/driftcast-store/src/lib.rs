//! Filesystem implementation of the driftcast chunk store port.
//!
//! One payload file per chunk plus a JSON sidecar metadata document, both
//! written atomically (temp file, fsync, rename). The substrate is
//! deliberately boring: all coordination guarantees live in the
//! [`driftcast_core::ChunkStore`] contract, and this crate upholds them over
//! flat files.

pub mod fs_store;
pub mod metadata;
pub mod recovery;

pub use fs_store::FsChunkStore;
pub use metadata::{METADATA_FILENAME, MetadataDocument};
pub use recovery::RecoveryReport;

// Silence unused dev-dependency warnings until more async test helpers land
#[cfg(test)]
use tokio_test as _;
