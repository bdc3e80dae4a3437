use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::utils::file_slug;
use crate::{
    select, CatalogSource, ContainerFormat, DownloadJob, DownloadOrchestrator, Error,
    PlaylistVideo, QualityFloor, Result, StreamDescriptor, StreamFilter, StreamKind,
    TransferProgress,
};

/// What a playlist run does after a video fails with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and go on with the next video
    #[default]
    Continue,
    /// Stop the run after the first failed video
    Abort,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Abort => "abort",
        }
    }
}

/// How the two streams of each playlist video are chosen
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChoice {
    /// Best streams at or below the ceilings
    Ceiling {
        resolution: QualityFloor,
        bitrate: QualityFloor,
    },
    /// The same format ids for every video, picked from the streams they all offer
    Pinned { video_id: String, audio_id: String },
}

/// Stream choice and container shared by every video of a run
#[derive(Debug, Clone, PartialEq)]
pub struct QualityConstraints {
    pub choice: StreamChoice,
    pub format: ContainerFormat,
}

impl QualityConstraints {
    pub fn ceiling(resolution: QualityFloor, bitrate: QualityFloor, format: ContainerFormat) -> Self {
        Self {
            choice: StreamChoice::Ceiling { resolution, bitrate },
            format,
        }
    }

    pub fn pinned(video_id: impl Into<String>, audio_id: impl Into<String>, format: ContainerFormat) -> Self {
        Self {
            choice: StreamChoice::Pinned {
                video_id: video_id.into(),
                audio_id: audio_id.into(),
            },
            format,
        }
    }

    /// Video and audio stream for one catalog
    pub fn pick(&self, catalog: &[StreamDescriptor]) -> Result<(StreamDescriptor, StreamDescriptor)> {
        match &self.choice {
            StreamChoice::Ceiling { resolution, bitrate } => Ok((
                select(catalog, *resolution, self.format).into_result()?,
                select(catalog, *bitrate, self.format).into_result()?,
            )),
            StreamChoice::Pinned { video_id, audio_id } => Ok((
                pinned_stream(catalog, video_id, StreamKind::Video, self.format)?,
                pinned_stream(catalog, audio_id, StreamKind::Audio, self.format)?,
            )),
        }
    }
}

fn pinned_stream(
    catalog: &[StreamDescriptor],
    id: &str,
    kind: StreamKind,
    format: ContainerFormat,
) -> Result<StreamDescriptor> {
    StreamFilter::for_selection(kind, format)
        .apply(catalog)
        .find(|stream| stream.id == id)
        .cloned()
        .ok_or_else(|| Error::MissingStream(id.to_string()))
}

/// One invocation over a playlist; nothing of it is persisted
#[derive(Debug, Clone)]
pub struct PlaylistRun {
    pub videos: Vec<PlaylistVideo>,
    pub destination_dir: PathBuf,
    pub constraints: QualityConstraints,
}

/// Result of processing one playlist entry
#[derive(Debug, Clone, PartialEq)]
pub enum VideoOutcome {
    Downloaded(PathBuf),
    /// A file for this video already exists
    Skipped(PathBuf),
    /// No stream satisfied the quality constraints, or a pinned stream is not offered
    Unsatisfiable(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoReport {
    /// 1-based playlist position
    pub position: usize,
    pub title: String,
    pub outcome: VideoOutcome,
}

/// Per-video outcomes in playlist order
#[derive(Debug, Clone, Default)]
pub struct PlaylistSummary {
    pub reports: Vec<VideoReport>,
    pub total: usize,
    /// The run stopped early under [`FailurePolicy::Abort`]
    pub aborted: bool,
}

impl PlaylistSummary {
    fn count(&self, predicate: impl Fn(&VideoOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, VideoOutcome::Downloaded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, VideoOutcome::Skipped(_)))
    }

    pub fn unsatisfiable(&self) -> usize {
        self.count(|o| matches!(o, VideoOutcome::Unsatisfiable(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, VideoOutcome::Failed(_)))
    }

    /// No video ended in an error; skips and unsatisfiable quality do not count
    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed() == 0
    }
}

/// Notifications emitted while a playlist is processed
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistEvent {
    Started {
        position: usize,
        total: usize,
        title: String,
    },
    Transfer {
        position: usize,
        progress: TransferProgress,
    },
    Finished {
        position: usize,
        outcome: VideoOutcome,
    },
}

pub type PlaylistEventFn<'a> = &'a (dyn Fn(PlaylistEvent) + Send + Sync);

/// `001-some-title.webm`
pub fn output_file_name(position: usize, slug: &str, extension: &str) -> String {
    format!("{:03}-{}.{}", position, slug, extension)
}

/// Find a previously downloaded file for `slug` in `dir`.
///
/// A file matches when its stem is `slug`, or `slug` behind a numeric
/// position prefix (`007-slug`), whatever the position: positions shift when
/// the remote playlist is edited between runs. Temporary files of interrupted
/// jobs are ignored; any other file counts as complete, including a
/// truncated one.
pub fn find_existing(dir: &Path, slug: &str) -> std::io::Result<Option<PathBuf>> {
    static POSITION_PREFIX: OnceLock<Regex> = OnceLock::new();
    let prefix = POSITION_PREFIX.get_or_init(|| Regex::new(r"^\d{3,}-").expect("valid regex"));

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with("temp_") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem == slug || prefix.replace(stem, "") == slug {
            return Ok(Some(path.clone()));
        }
    }
    Ok(None)
}

/// Applies selection and download to every video of a playlist, in order
pub struct PlaylistDriver {
    catalog: Arc<dyn CatalogSource>,
    orchestrator: Arc<DownloadOrchestrator>,
    failure_policy: FailurePolicy,
}

impl PlaylistDriver {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        orchestrator: Arc<DownloadOrchestrator>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            catalog,
            orchestrator,
            failure_policy,
        }
    }

    pub async fn run(&self, run: &PlaylistRun, events: PlaylistEventFn<'_>) -> Result<PlaylistSummary> {
        tokio::fs::create_dir_all(&run.destination_dir).await?;

        let total = run.videos.len();
        let mut summary = PlaylistSummary {
            total,
            ..Default::default()
        };

        for (index, video) in run.videos.iter().enumerate() {
            let position = index + 1;
            events(PlaylistEvent::Started {
                position,
                total,
                title: video.title.clone(),
            });

            let outcome = self.process(position, video, run, events).await;
            match &outcome {
                VideoOutcome::Downloaded(path) => info!("[{}/{}] saved {}", position, total, path.display()),
                VideoOutcome::Skipped(path) => {
                    info!("[{}/{}] already present as {}", position, total, path.display())
                }
                VideoOutcome::Unsatisfiable(reason) => warn!("[{}/{}] {}", position, total, reason),
                VideoOutcome::Failed(reason) => warn!("[{}/{}] failed: {}", position, total, reason),
            }

            events(PlaylistEvent::Finished {
                position,
                outcome: outcome.clone(),
            });

            let failed = matches!(outcome, VideoOutcome::Failed(_));
            summary.reports.push(VideoReport {
                position,
                title: video.title.clone(),
                outcome,
            });

            if failed && self.failure_policy == FailurePolicy::Abort {
                warn!("Stopping playlist after failure of video {}", position);
                summary.aborted = position < total;
                break;
            }
        }

        Ok(summary)
    }

    async fn process(
        &self,
        position: usize,
        video: &PlaylistVideo,
        run: &PlaylistRun,
        events: PlaylistEventFn<'_>,
    ) -> VideoOutcome {
        let slug = file_slug(&video.title);

        match find_existing(&run.destination_dir, &slug) {
            Ok(Some(existing)) => return VideoOutcome::Skipped(existing),
            Ok(None) => {}
            Err(err) => return VideoOutcome::Failed(err.to_string()),
        }

        match self.download(position, &slug, video, run, events).await {
            Ok(path) => VideoOutcome::Downloaded(path),
            Err(err @ (Error::Unsatisfiable { .. } | Error::MissingStream(_))) => {
                VideoOutcome::Unsatisfiable(err.to_string())
            }
            Err(err) => VideoOutcome::Failed(err.to_string()),
        }
    }

    async fn download(
        &self,
        position: usize,
        slug: &str,
        video: &PlaylistVideo,
        run: &PlaylistRun,
        events: PlaylistEventFn<'_>,
    ) -> Result<PathBuf> {
        let constraints = &run.constraints;
        let info = self.catalog.video_info(&video.url).await?;

        let (video_stream, audio_stream) = constraints.pick(&info.streams)?;

        let job = DownloadJob {
            video_id: info.id,
            video_url: info.url,
            video_stream,
            audio_stream,
            destination_dir: run.destination_dir.clone(),
            file_name: output_file_name(position, slug, constraints.format.extension()),
        };

        let forward = |progress: TransferProgress| events(PlaylistEvent::Transfer { position, progress });
        self.orchestrator.run(&job, &forward).await
    }
}
