//! Process-backed implementations of the engine's collaborator ports.
//!
//! Synthesis shells out to a configured command per chunk, delivery pipes
//! audio units into a long-lived encoder process, and stitching drives
//! ffmpeg's concat demuxer. All three hold no state beyond their process
//! handles; coordination state stays in the store.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use driftcast_core::ports::delivery::{DeliveryError, DeliverySink};
use driftcast_core::ports::stitcher::{StitchError, Stitcher};
use driftcast_core::ports::synthesis::{SynthesisError, Synthesizer};

/// Split a command line on whitespace. Quoting is not supported; wrap
/// anything complicated in a script.
fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

fn truncate_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() > 500 {
        format!("{}...", &trimmed[..500])
    } else {
        trimmed.to_string()
    }
}

/// Runs a configured command per chunk: `<cmd> <prompt> <duration-secs>`,
/// raw audio expected on stdout.
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(command: &str) -> Result<Self, SynthesisError> {
        let (program, args) = split_command(command)
            .ok_or_else(|| SynthesisError::Backend("empty synthesis command".to_string()))?;
        Ok(Self { program, args })
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn synthesize(&self, prompt: &str, duration_secs: u32) -> Result<Vec<u8>, SynthesisError> {
        debug!(program = %self.program, duration_secs, "invoking synthesis command");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(prompt)
            .arg(duration_secs.to_string())
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(SynthesisError::Backend(format!(
                "exit {}: {}",
                output.status,
                truncate_stderr(&output.stderr)
            )));
        }
        if output.stdout.is_empty() {
            return Err(SynthesisError::Backend(
                "command produced no audio".to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

/// Pipes audio units into a long-lived encoder process's stdin.
pub struct PipeDelivery {
    child: Mutex<Child>,
}

impl PipeDelivery {
    /// Spawn the delivery process. Its stdin stays open for the lifetime of
    /// this sink; stdout/stderr are discarded.
    pub fn spawn(command: &str) -> Result<Self, DeliveryError> {
        let (program, args) = split_command(command)
            .ok_or_else(|| DeliveryError::Backend("empty delivery command".to_string()))?;
        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        debug!(program = %program, "delivery process spawned");
        Ok(Self {
            child: Mutex::new(child),
        })
    }
}

#[async_trait]
impl DeliverySink for PipeDelivery {
    async fn deliver(&self, audio: &[u8], is_break_unit: bool) -> Result<(), DeliveryError> {
        let mut child = self.child.lock().await;
        let stdin = child.stdin.as_mut().ok_or(DeliveryError::Closed)?;
        let written = async {
            stdin.write_all(audio).await?;
            stdin.flush().await
        }
        .await;
        match written {
            Ok(()) => {
                debug!(bytes = audio.len(), is_break_unit, "unit delivered");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                warn!("delivery process closed its stdin");
                Err(DeliveryError::Closed)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Concatenates chunk files with ffmpeg's concat demuxer.
pub struct FfmpegStitcher {
    ffmpeg: PathBuf,
}

impl Default for FfmpegStitcher {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegStitcher {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

#[async_trait]
impl Stitcher for FfmpegStitcher {
    async fn stitch(&self, sources: &[PathBuf], output: &Path) -> Result<PathBuf, StitchError> {
        if sources.is_empty() {
            return Err(StitchError::Backend("no source chunks to stitch".into()));
        }

        // The concat demuxer takes a list file; single quotes in our chunk
        // filenames cannot occur by construction.
        let mut list = String::new();
        for source in sources {
            list.push_str(&format!("file '{}'\n", source.display()));
        }
        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, list).await?;

        let result = Command::new(&self.ffmpeg)
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .output()
            .await;
        let _ = tokio::fs::remove_file(&list_path).await;

        let out = result?;
        if !out.status.success() {
            return Err(StitchError::Backend(format!(
                "ffmpeg exit {}: {}",
                out.status,
                truncate_stderr(&out.stderr)
            )));
        }
        Ok(output.to_path_buf())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_synthesizer_captures_stdout() {
        let synth = CommandSynthesizer::new("echo").unwrap();
        let payload = synth.synthesize("calm lofi", 60).await.unwrap();
        assert_eq!(payload, b"calm lofi 60\n");
    }

    #[tokio::test]
    async fn failing_command_is_a_backend_error() {
        let synth = CommandSynthesizer::new("false").unwrap();
        let err = synth.synthesize("calm", 60).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Backend(_)));
    }

    #[tokio::test]
    async fn empty_output_is_rejected() {
        let synth = CommandSynthesizer::new("true").unwrap();
        let err = synth.synthesize("calm", 60).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Backend(_)));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandSynthesizer::new("   ").is_err());
        assert!(PipeDelivery::spawn("").is_err());
    }

    #[tokio::test]
    async fn pipe_delivery_writes_to_stdin() {
        let sink = PipeDelivery::spawn("cat").unwrap();
        sink.deliver(b"pcm data", false).await.unwrap();
        sink.deliver(b"more", true).await.unwrap();
    }

    #[tokio::test]
    async fn exited_delivery_process_reports_an_error() {
        let sink = PipeDelivery::spawn("true").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        // Large enough to overflow the dead pipe's kernel buffer.
        let unit = vec![0u8; 1 << 20];
        assert!(sink.deliver(&unit, false).await.is_err());
    }

    #[tokio::test]
    async fn stitch_with_no_sources_fails_fast() {
        let stitcher = FfmpegStitcher::default();
        let err = stitcher
            .stitch(&[], Path::new("/tmp/out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, StitchError::Backend(_)));
    }
}
