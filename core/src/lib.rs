pub mod config;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod geo;
pub mod merger;
pub mod playlist;
pub mod quality;
pub mod utils;

pub use self::config::*;
pub use downloader::*;
pub use error::*;
pub use extractor::*;
pub use geo::*;
pub use merger::*;
pub use playlist::*;
pub use quality::*;
pub use utils::*;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Availability of the external executables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus {
    pub ytdlp: bool,
    pub ffmpeg: bool,
}

/// Main pipeline: catalog lookup, single downloads and playlist runs
pub struct TubeMux {
    catalog: Arc<dyn CatalogSource>,
    orchestrator: Arc<DownloadOrchestrator>,
    playlists: PlaylistDriver,
    ytdlp: YtDlpDownloader,
    ffmpeg: FfmpegMuxer,
}

impl TubeMux {
    /// Wire the yt-dlp and ffmpeg backed components from configuration
    pub fn from_config(config: &AppConfig) -> Self {
        let catalog: Arc<dyn CatalogSource> = Arc::new(YouTubeExtractor::new(
            &config.ytdlp_path,
            config.extract_timeout_secs,
        ));
        let downloader = Arc::new(YtDlpDownloader::new(
            &config.ytdlp_path,
            config.download_timeout_secs,
        ));
        let muxer = Arc::new(FfmpegMuxer::new(&config.ffmpeg_path, config.merge_timeout_secs));

        let orchestrator = Arc::new(
            DownloadOrchestrator::new(downloader, muxer).with_parallel_streams(config.parallel_streams),
        );
        let playlists = PlaylistDriver::new(catalog.clone(), orchestrator.clone(), config.on_failure);

        Self {
            catalog,
            orchestrator,
            playlists,
            ytdlp: YtDlpDownloader::new(&config.ytdlp_path, config.download_timeout_secs),
            ffmpeg: FfmpegMuxer::new(&config.ffmpeg_path, config.merge_timeout_secs),
        }
    }

    pub async fn check_tools(&self) -> ToolStatus {
        let (ytdlp, ffmpeg) = tokio::join!(self.ytdlp.is_available(), self.ffmpeg.is_available());
        if !ytdlp {
            warn!("yt-dlp executable is not available");
        }
        if !ffmpeg {
            warn!("ffmpeg executable is not available");
        }
        ToolStatus { ytdlp, ffmpeg }
    }

    pub async fn video_info(&self, url: &str) -> Result<VideoInfo> {
        if !is_valid_youtube_url(url) {
            return Err(Error::InvalidInput(format!("not a YouTube URL: {}", url)));
        }
        self.catalog.video_info(url).await
    }

    pub async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo> {
        if !is_valid_youtube_url(url) {
            return Err(Error::InvalidInput(format!("not a YouTube URL: {}", url)));
        }
        self.catalog.playlist_info(url).await
    }

    /// Download both streams of one video and merge them into `job.output_path()`
    pub async fn download(&self, job: &DownloadJob, progress: ProgressFn<'_>) -> Result<PathBuf> {
        info!("Starting download: {} -> {}", job.video_url, job.output_path().display());
        self.orchestrator.run(job, progress).await
    }

    pub async fn run_playlist(&self, run: &PlaylistRun, events: PlaylistEventFn<'_>) -> Result<PlaylistSummary> {
        info!(
            "Processing {} playlist videos into {}",
            run.videos.len(),
            run.destination_dir.display()
        );
        self.playlists.run(run, events).await
    }
}
