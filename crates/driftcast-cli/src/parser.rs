//! Main CLI parser and top-level argument handling.
//!
//! This module defines the root CLI structure with global options.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the driftcast audio buffer daemon.
///
/// This is the top-level parser that handles global options and dispatches
/// to subcommands.
#[derive(Parser)]
#[command(name = "driftcast")]
#[command(about = "Durable audio chunk buffer for continuous streaming")]
#[command(version)]
pub struct Cli {
    /// Override the buffer directory for this invocation
    #[arg(long = "buffer-dir", global = true, env = "DRIFTCAST_BUFFER_DIR")]
    pub buffer_dir: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_args() {
        let cli = Cli::parse_from([
            "driftcast",
            "--verbose",
            "--buffer-dir",
            "/tmp/buffer",
            "status",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.buffer_dir, Some(PathBuf::from("/tmp/buffer")));
    }

    #[test]
    fn run_mode_flags_conflict() {
        let result = Cli::try_parse_from([
            "driftcast",
            "run",
            "--producer-only",
            "--consumer-only",
            "--synth-cmd",
            "synth",
        ]);
        assert!(result.is_err());
    }
}
