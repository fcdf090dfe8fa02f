//! Stitching port definition (content-library variant).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How chunks are picked out of the library when building a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// The first N chunks in sequence order.
    Sequential,
    /// Evenly spaced picks across the whole library, for variety without
    /// breaking sequence order.
    Spread,
}

/// Errors returned by the stitching collaborator.
#[derive(Debug, Error)]
pub enum StitchError {
    /// The concatenation tool failed.
    #[error("stitching failed: {0}")]
    Backend(String),

    #[error("stitch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for the audio concatenation tool.
///
/// Sources are handed over already selected and ordered; the implementation
/// only concatenates them into one artifact.
#[async_trait]
pub trait Stitcher: Send + Sync {
    /// Concatenate `sources` in order into `output`; returns the artifact
    /// path.
    async fn stitch(&self, sources: &[PathBuf], output: &Path) -> Result<PathBuf, StitchError>;
}
