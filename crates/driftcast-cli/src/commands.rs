//! Main commands enum and subcommand arguments.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};

use driftcast_core::ports::stitcher::SelectionStrategy;

/// Chunk selection strategy for stitching, as a CLI value.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// The first N chunks in sequence order
    Sequential,
    /// Evenly spaced picks across the whole library
    Spread,
}

impl From<StrategyArg> for SelectionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => Self::Sequential,
            StrategyArg::Spread => Self::Spread,
        }
    }
}

/// Available commands for the driftcast buffer daemon.
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the buffer directory with a default configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Show buffer statistics and health
    Status {
        /// Emit machine-readable JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },

    /// Run the continuous producer and consumer loops
    Run {
        /// Synthesis command, invoked as `<cmd> <prompt> <duration-secs>`
        /// with the raw audio payload expected on stdout
        #[arg(long = "synth-cmd")]
        synth_cmd: Option<String>,

        /// Delivery command (e.g. an ffmpeg encoder invocation); audio
        /// units are written to its stdin
        #[arg(long = "deliver-cmd")]
        deliver_cmd: Option<String>,

        /// Run only the producer loop
        #[arg(long, conflicts_with = "consumer_only")]
        producer_only: bool,

        /// Run only the consumer loop
        #[arg(long)]
        consumer_only: bool,
    },

    /// Run one scheduled production session against the weekly quota
    Session {
        /// Synthesis command, invoked as `<cmd> <prompt> <duration-secs>`
        #[arg(long = "synth-cmd")]
        synth_cmd: String,
    },

    /// Show weekly quota progress
    Progress {
        /// Emit machine-readable JSON instead of the text summary
        #[arg(long)]
        json: bool,
    },

    /// Rebuild buffer metadata from the payload files on disk
    Recover,

    /// Stitch stored chunks into one long-form audio file
    Stitch {
        /// How many chunks to include
        #[arg(short, long, default_value = "60")]
        count: usize,

        /// How chunks are picked out of the library
        #[arg(long, value_enum, default_value = "spread")]
        strategy: StrategyArg,

        /// Output file path
        output: PathBuf,
    },
}
