//! CLI adapter for driftcast.
//!
//! `parser`/`commands` define the argument surface, `bootstrap` is the
//! composition root where the store and configuration are wired together,
//! `adapters` hold the process-backed synthesis/delivery/stitch
//! implementations, and `handlers` carry out each command.

pub mod adapters;
pub mod bootstrap;
pub mod commands;
pub mod handlers;
pub mod parser;

pub use bootstrap::{CliContext, bootstrap};
pub use commands::Commands;
pub use parser::Cli;

// Silence unused dev-dependency warnings until async test helpers land
#[cfg(test)]
use tokio_test as _;
