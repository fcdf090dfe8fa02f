//! CLI bootstrap - the composition root.
//!
//! This is the ONLY place where infrastructure is wired together for the
//! CLI adapter: the buffer directory is resolved, the configuration file is
//! loaded and validated, and the filesystem store is opened (running
//! recovery if the metadata document is missing or corrupt). Command
//! handlers receive the composed context and delegate to the engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use driftcast_core::config::BufferConfig;
use driftcast_store::{FsChunkStore, RecoveryReport};

/// Configuration file name inside the buffer directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Fully composed context for CLI commands.
pub struct CliContext {
    pub buffer_dir: PathBuf,
    pub config: BufferConfig,
    pub store: Arc<FsChunkStore>,
    pub recovery: RecoveryReport,
}

/// Resolve the buffer directory: the `--buffer-dir` flag (which also reads
/// `DRIFTCAST_BUFFER_DIR`) wins, otherwise the platform data directory.
pub fn resolve_buffer_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    let base = dirs::data_dir().context("no platform data directory; pass --buffer-dir")?;
    Ok(base.join("driftcast").join("buffer"))
}

/// Load and validate the configuration, falling back to defaults when no
/// file exists yet.
pub fn load_config(buffer_dir: &Path) -> Result<BufferConfig> {
    let path = buffer_dir.join(CONFIG_FILENAME);
    let config = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        BufferConfig::default()
    };
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Write the default configuration file.
pub fn write_default_config(buffer_dir: &Path, force: bool) -> Result<PathBuf> {
    fs::create_dir_all(buffer_dir)
        .with_context(|| format!("creating {}", buffer_dir.display()))?;
    let path = buffer_dir.join(CONFIG_FILENAME);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let serialized = serde_json::to_string_pretty(&BufferConfig::default())?;
    fs::write(&path, serialized).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Bootstrap the CLI application: resolve paths, load configuration, open
/// the store.
pub async fn bootstrap(buffer_dir_flag: Option<PathBuf>) -> Result<CliContext> {
    let buffer_dir = resolve_buffer_dir(buffer_dir_flag)?;
    let config = load_config(&buffer_dir)?;

    let (store, recovery) = FsChunkStore::open(&buffer_dir, &config)
        .await
        .with_context(|| format!("opening buffer store at {}", buffer_dir.display()))?;

    if recovery.rebuilt {
        warn!(
            recovered = recovery.recovered,
            skipped = recovery.skipped_files,
            prompt_mismatches = recovery.prompt_mismatches,
            "buffer metadata was rebuilt from payload files"
        );
    } else {
        info!(
            buffer_dir = %buffer_dir.display(),
            chunks = recovery.recovered,
            "buffer store opened"
        );
    }

    Ok(CliContext {
        buffer_dir,
        config,
        store: Arc::new(store),
        recovery,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_flag_wins() {
        let dir = resolve_buffer_dir(Some(PathBuf::from("/tmp/x"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config, BufferConfig::default());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            // Prompt duration not a multiple of chunk duration.
            r#"{"chunk_duration_secs": 45, "prompt_duration_secs": 100}"#,
        )
        .unwrap();
        assert!(load_config(dir.path()).is_err());
    }

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = tempdir().unwrap();
        let path = write_default_config(dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(load_config(dir.path()).is_ok());

        // Refuses to clobber without force.
        assert!(write_default_config(dir.path(), false).is_err());
        assert!(write_default_config(dir.path(), true).is_ok());
    }
}
