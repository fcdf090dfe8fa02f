//! CLI entry point - the composition root.
//!
//! Parses arguments, initializes tracing, bootstraps the store through
//! `bootstrap`, and dispatches to the handlers. No infrastructure is wired
//! anywhere else.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use driftcast_cli::{Cli, Commands, bootstrap, handlers};

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        // These run before (or instead of) a normal store open.
        Commands::Init { force } => handlers::init(cli.buffer_dir, force)?,
        Commands::Recover => handlers::recover(cli.buffer_dir).await?,

        command => {
            let ctx = bootstrap(cli.buffer_dir).await?;
            match command {
                Commands::Status { json } => handlers::status(&ctx, json).await?,
                Commands::Run {
                    synth_cmd,
                    deliver_cmd,
                    producer_only,
                    consumer_only,
                } => {
                    handlers::run(&ctx, synth_cmd, deliver_cmd, producer_only, consumer_only)
                        .await?;
                }
                Commands::Session { synth_cmd } => handlers::session(&ctx, &synth_cmd).await?,
                Commands::Progress { json } => handlers::progress(&ctx, json).await?,
                Commands::Stitch {
                    count,
                    strategy,
                    output,
                } => handlers::stitch(&ctx, count, strategy.into(), output).await?,
                Commands::Init { .. } | Commands::Recover => unreachable!(),
            }
        }
    }

    Ok(())
}
