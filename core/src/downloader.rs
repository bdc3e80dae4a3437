use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::utils::{temp_token, with_timeout};
use crate::{Error, Muxer, Result, StreamDescriptor, StreamKind};

/// Marker prefixed to the progress lines requested from yt-dlp
const PROGRESS_MARKER: &str = "[tubemux-progress]";

/// Progress of a single stream transfer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub kind: StreamKind,
    pub downloaded: u64,
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Fraction complete in `0.0..=1.0`, when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.downloaded as f64 / total as f64).min(1.0)),
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.total.map(|total| total.saturating_sub(self.downloaded))
    }
}

/// Progress sink shared by the adapters
pub type ProgressFn<'a> = &'a (dyn Fn(TransferProgress) + Send + Sync);

/// Transfers one stream of a video to a local file
#[async_trait]
pub trait StreamDownloader: Send + Sync {
    async fn download(
        &self,
        video_url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<()>;
}

/// Stream downloader that runs yt-dlp for a single format id
pub struct YtDlpDownloader {
    ytdlp_path: PathBuf,
    timeout_secs: u64,
}

impl YtDlpDownloader {
    pub fn new(ytdlp_path: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            timeout_secs,
        }
    }

    /// Check if yt-dlp is available
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ytdlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn run_ytdlp(
        &self,
        video_url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        let template = format!(
            "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes,progress.total_bytes_estimate)s",
            PROGRESS_MARKER
        );

        let mut child = Command::new(&self.ytdlp_path)
            .args(["--newline", "--no-part", "--no-playlist", "--no-warnings"])
            .args(["--force-overwrites", "--progress-template", template.as_str()])
            .arg("-f")
            .arg(&stream.id)
            .arg("-o")
            .arg(destination)
            .arg(video_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => {
                    Error::Transfer(format!("yt-dlp not found at {}", self.ytdlp_path.display()))
                }
                _ => Error::Transfer(format!("failed to start yt-dlp: {}", err)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transfer("yt-dlp stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Transfer("yt-dlp stderr unavailable".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some((downloaded, total)) = parse_progress_line(&line) {
                progress(TransferProgress {
                    kind: stream.kind,
                    downloaded,
                    total: total.or(stream.size),
                });
            }
        }

        let status = child.wait().await?;
        let diagnostics = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(Error::Transfer(format!(
                "yt-dlp exited with {} for format {}: {}",
                status,
                stream.id,
                diagnostics.trim()
            )));
        }
        Ok(())
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new("yt-dlp", 3600)
    }
}

#[async_trait]
impl StreamDownloader for YtDlpDownloader {
    async fn download(
        &self,
        video_url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        debug!("Downloading format {} to {}", stream.id, destination.display());
        with_timeout(
            "stream download",
            self.timeout_secs,
            self.run_ytdlp(video_url, stream, destination, progress),
        )
        .await
    }
}

/// Parse a `[tubemux-progress] <downloaded> <total>` line.
///
/// yt-dlp prints `NA` for unknown fields and floats for size estimates.
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let mut fields = line.trim().strip_prefix(PROGRESS_MARKER)?.split_whitespace();
    let downloaded = parse_byte_count(fields.next()?)?;
    let total = fields.next().and_then(parse_byte_count);
    Some((downloaded, total))
}

fn parse_byte_count(field: &str) -> Option<u64> {
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().map(|value| value as u64))
}

/// One video's download-and-merge unit of work
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub video_id: String,
    pub video_url: String,
    pub video_stream: StreamDescriptor,
    pub audio_stream: StreamDescriptor,
    pub destination_dir: PathBuf,
    /// Final file name including the extension
    pub file_name: String,
}

impl DownloadJob {
    pub fn output_path(&self) -> PathBuf {
        self.destination_dir.join(&self.file_name)
    }

    fn output_extension(&self) -> &str {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(&self.video_stream.container)
    }
}

/// Removes the temporary files of a job when dropped
struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed temporary file {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("Could not remove {}: {}", path.display(), err),
            }
        }
    }
}

/// Downloads the two streams of a job, merges them and cleans up after itself
pub struct DownloadOrchestrator {
    downloader: Arc<dyn StreamDownloader>,
    muxer: Arc<dyn Muxer>,
    parallel_streams: bool,
}

impl DownloadOrchestrator {
    pub fn new(downloader: Arc<dyn StreamDownloader>, muxer: Arc<dyn Muxer>) -> Self {
        Self {
            downloader,
            muxer,
            parallel_streams: false,
        }
    }

    /// Download video and audio concurrently instead of one after the other
    pub fn with_parallel_streams(mut self, parallel: bool) -> Self {
        self.parallel_streams = parallel;
        self
    }

    /// Run a job and return the merged file path.
    ///
    /// Temporary files live next to the output under a per-job random token
    /// and are removed on every exit path. The merged file is written under a
    /// temporary name and renamed into place, so the final name only ever
    /// refers to a complete file. An existing output is never overwritten.
    pub async fn run(&self, job: &DownloadJob, progress: ProgressFn<'_>) -> Result<PathBuf> {
        let output = job.output_path();
        if tokio::fs::try_exists(&output).await? {
            return Err(Error::FilesystemConflict(output));
        }
        tokio::fs::create_dir_all(&job.destination_dir).await?;

        let token = temp_token();
        let dir = &job.destination_dir;
        let video_tmp = dir.join(format!("temp_vid_{}.{}", token, job.video_stream.container));
        let audio_tmp = dir.join(format!("temp_aud_{}.{}", token, job.audio_stream.container));
        let merged_tmp = dir.join(format!("temp_mux_{}.{}", token, job.output_extension()));
        let _cleanup = TempFiles::new(vec![
            video_tmp.clone(),
            audio_tmp.clone(),
            merged_tmp.clone(),
        ]);

        info!(
            "Downloading {} (video {}, audio {})",
            job.video_id, job.video_stream.id, job.audio_stream.id
        );

        let video = self
            .downloader
            .download(&job.video_url, &job.video_stream, &video_tmp, progress);
        let audio = self
            .downloader
            .download(&job.video_url, &job.audio_stream, &audio_tmp, progress);

        if self.parallel_streams {
            tokio::try_join!(video, audio)?;
        } else {
            video.await?;
            audio.await?;
        }

        info!("Download complete. Merging audio and video...");
        self.muxer.merge(&video_tmp, &audio_tmp, &merged_tmp).await?;

        tokio::fs::rename(&merged_tmp, &output).await?;
        info!("Saved {}", output.display());
        Ok(output)
    }
}
