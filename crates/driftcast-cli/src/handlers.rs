//! Command handlers. Each receives the composed context (or, for commands
//! that must run before the store exists, just the buffer directory flag)
//! and delegates the actual work to the engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use driftcast_core::ChunkStore;
use driftcast_core::domain::session::SessionOutcome;
use driftcast_core::ports::stitcher::{SelectionStrategy, Stitcher};
use driftcast_engine::session::select_sources;
use driftcast_engine::{Consumer, Orchestrator, Producer, SessionRunner};
use driftcast_store::FsChunkStore;

use crate::adapters::{CommandSynthesizer, FfmpegStitcher, PipeDelivery};
use crate::bootstrap::{self, CliContext};

/// Initialize the buffer directory with a default configuration file.
pub fn init(buffer_dir_flag: Option<PathBuf>, force: bool) -> Result<()> {
    let buffer_dir = bootstrap::resolve_buffer_dir(buffer_dir_flag)?;
    let path = bootstrap::write_default_config(&buffer_dir, force)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Buffer directory: {}", buffer_dir.display());
    Ok(())
}

/// Show buffer statistics and the current health state.
#[allow(clippy::cast_precision_loss)]
pub async fn status(ctx: &CliContext, json: bool) -> Result<()> {
    let stats = ctx.store.stats().await?;
    let reading = ctx.config.thresholds.evaluate(stats.unconsumed_duration_secs);

    if json {
        let payload = serde_json::json!({
            "buffer_dir": ctx.buffer_dir,
            "health": reading.state.as_str(),
            "cooldown_secs": reading.cooldown_secs,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let hours = stats.unconsumed_duration_secs as f64 / 3600.0;
    println!("Buffer:   {}", ctx.buffer_dir.display());
    println!(
        "Health:   {} ({:.1}h of unconsumed audio, cooldown {}s)",
        reading.state, hours, reading.cooldown_secs
    );
    println!(
        "Chunks:   {} total, {} unconsumed, {} consumed",
        stats.total, stats.unconsumed, stats.consumed
    );
    println!("Lifetime: {} chunks consumed", stats.total_consumed);
    Ok(())
}

/// Run the continuous loops until interrupted.
pub async fn run(
    ctx: &CliContext,
    synth_cmd: Option<String>,
    deliver_cmd: Option<String>,
    producer_only: bool,
    consumer_only: bool,
) -> Result<()> {
    if !consumer_only && synth_cmd.is_none() {
        anyhow::bail!("--synth-cmd is required unless running --consumer-only");
    }
    if !producer_only && deliver_cmd.is_none() {
        anyhow::bail!("--deliver-cmd is required unless running --producer-only");
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    let store = Arc::clone(&ctx.store);
    let config = ctx.config.clone();

    if producer_only {
        let synth = Arc::new(CommandSynthesizer::new(&synth_cmd.unwrap_or_default())?);
        Producer::new(store, synth, config).run(cancel).await?;
    } else if consumer_only {
        let sink = Arc::new(PipeDelivery::spawn(&deliver_cmd.unwrap_or_default())?);
        Consumer::new(store, sink, config).run(cancel).await?;
    } else {
        let synth = Arc::new(CommandSynthesizer::new(&synth_cmd.unwrap_or_default())?);
        let sink = Arc::new(PipeDelivery::spawn(&deliver_cmd.unwrap_or_default())?);
        Orchestrator::new(store, synth, sink, config).run(cancel).await?;
    }
    Ok(())
}

/// Run one scheduled production session against the weekly quota.
pub async fn session(ctx: &CliContext, synth_cmd: &str) -> Result<()> {
    let synth = Arc::new(CommandSynthesizer::new(synth_cmd)?);
    let runner = SessionRunner::new(Arc::clone(&ctx.store), synth, ctx.config.clone())?;

    match runner.run_session(Utc::now()).await? {
        SessionOutcome::QuotaMet { week_id } => {
            println!("Weekly quota for {week_id} already met; nothing produced.");
        }
        SessionOutcome::Produced {
            week_id,
            produced,
            remaining,
        } => {
            println!("Produced {produced} chunks for {week_id}; {remaining} remaining this week.");
        }
    }
    Ok(())
}

/// Show weekly quota progress.
pub async fn progress(ctx: &CliContext, json: bool) -> Result<()> {
    // The synthesizer is never invoked on this read-only path.
    let synth = Arc::new(CommandSynthesizer::new("true")?);
    let runner = SessionRunner::new(Arc::clone(&ctx.store), synth, ctx.config.clone())?;
    let report = runner.weekly_progress(Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Week {}", report.week_id);
    println!(
        "Chunks:   {}/{} ({:.1}%), {} remaining",
        report.completed_chunks,
        report.target_chunks,
        report.progress_percent,
        report.remaining_chunks
    );
    println!(
        "Sessions: {} completed, {} remaining",
        report.sessions_completed, report.sessions_remaining
    );
    Ok(())
}

/// Force a metadata rebuild from the payload files on disk.
pub async fn recover(buffer_dir_flag: Option<PathBuf>) -> Result<()> {
    let buffer_dir = bootstrap::resolve_buffer_dir(buffer_dir_flag)?;
    let config = bootstrap::load_config(&buffer_dir)?;
    let (_, report) = FsChunkStore::rebuild(&buffer_dir, &config).await?;

    println!("Rebuilt metadata at {}", buffer_dir.display());
    println!("Recovered:        {} chunks (all marked available)", report.recovered);
    println!("Skipped files:    {}", report.skipped_files);
    println!("Prompt mismatches: {}", report.prompt_mismatches);
    Ok(())
}

/// Stitch stored chunks into one long-form audio file.
pub async fn stitch(
    ctx: &CliContext,
    count: usize,
    strategy: SelectionStrategy,
    output: PathBuf,
) -> Result<()> {
    let paths = ctx.store.payload_paths().await?;
    let sources = select_sources(&paths, count, strategy);
    if sources.is_empty() {
        anyhow::bail!("the buffer holds no chunks to stitch");
    }

    let stitcher = FfmpegStitcher::default();
    let artifact = stitcher.stitch(&sources, &output).await?;
    println!(
        "Stitched {} chunks into {}",
        sources.len(),
        artifact.display()
    );
    Ok(())
}
