use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::utils::with_timeout;
use crate::{Error, Result};

/// Combines a video-only and an audio-only file into one container
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// Remuxes with ffmpeg using stream copy; sample data is never re-encoded
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
    timeout_secs: u64,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout_secs,
        }
    }

    /// Arguments for a stream-copy merge of the first video and first audio track
    pub fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push("-i".into());
        args.push(video.into());
        args.push("-i".into());
        args.push(audio.into());
        for arg in ["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "copy"] {
            args.push(arg.into());
        }
        args.push(output.into());
        args
    }

    /// Check if ffmpeg is available
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn run_ffmpeg(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let args = Self::merge_args(video, audio, output);
        debug!("Running {} {:?}", self.ffmpeg_path.display(), args);

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Error::Merge(format!(
                    "ffmpeg not found at {}",
                    self.ffmpeg_path.display()
                )));
            }
            Err(err) => return Err(Error::Merge(format!("failed to start ffmpeg: {}", err))),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Merge(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg", 600)
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        info!("Merging {} + {}", video.display(), audio.display());

        with_timeout("merge", self.timeout_secs, self.run_ffmpeg(video, audio, output))
            .await
            .map_err(|err| match err {
                Error::Timeout { .. } => Error::Merge(err.to_string()),
                other => other,
            })?;

        info!("Merged file saved to: {}", output.display());
        Ok(())
    }
}
