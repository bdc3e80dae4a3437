use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info};
use youtube_dl::{Format, SingleVideo, YoutubeDl};

use crate::utils::with_timeout;
use crate::{Error, RankScale, Result, RESOLUTIONS};

/// Whether a stream carries video, audio, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
    Combined,
}

/// One selectable stream of a video, normalized from the extractor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Format id (itag); unique within a video's catalog
    pub id: String,
    pub kind: StreamKind,
    /// e.g. "1080p", video streams only
    pub resolution: Option<String>,
    /// e.g. "128kbps", audio streams only
    pub bitrate: Option<String>,
    /// Container subtype, e.g. "mp4", "m4a", "webm"
    pub container: String,
    /// Approximate size in bytes
    pub size: Option<u64>,
    pub codec: Option<String>,
    pub fps: Option<f32>,
}

impl StreamDescriptor {
    /// Quality label on the scale matching this stream's kind
    pub fn quality_label(&self) -> Option<&str> {
        match self.kind {
            StreamKind::Video => self.resolution.as_deref(),
            StreamKind::Audio => self.bitrate.as_deref(),
            StreamKind::Combined => None,
        }
    }

    fn from_format(format: &Format) -> Option<Self> {
        let id = format.format_id.clone()?;
        let vcodec = present_codec(format.vcodec.as_deref());
        let acodec = present_codec(format.acodec.as_deref());

        let kind = match (vcodec, acodec) {
            (Some(_), Some(_)) => StreamKind::Combined,
            (Some(_), None) => StreamKind::Video,
            (None, Some(_)) => StreamKind::Audio,
            // storyboards and other non-media entries
            (None, None) => return None,
        };

        let resolution = match kind {
            StreamKind::Audio => None,
            _ => resolution_label(format),
        };
        let bitrate = match kind {
            StreamKind::Audio => nominal_bitrate(&id)
                .map(str::to_string)
                .or_else(|| format.abr.map(|abr| format!("{}kbps", abr.round() as u32))),
            _ => None,
        };
        let codec = match kind {
            StreamKind::Audio => acodec,
            _ => vcodec,
        }
        .map(str::to_string);

        Some(Self {
            id,
            kind,
            resolution,
            bitrate,
            container: format.ext.clone().unwrap_or_default(),
            size: format
                .filesize
                .map(|size| size as u64)
                .or_else(|| format.filesize_approx.map(|size| size as u64)),
            codec,
            fps: format.fps.map(|fps| fps as f32),
        })
    }
}

fn present_codec(codec: Option<&str>) -> Option<&str> {
    codec.filter(|c| !c.is_empty() && *c != "none")
}

/// Nominal resolution label of a video format.
///
/// YouTube labels a stream by its 16:9 landscape equivalent, so a portrait
/// 1080x1920 or a letterboxed 1920x800 stream is still "1080p". That label is
/// carried in `format_note` (possibly with a frame rate, as in "1080p60");
/// without it the label is derived from the frame dimensions.
fn resolution_label(format: &Format) -> Option<String> {
    static NOTE: OnceLock<Regex> = OnceLock::new();
    let note = NOTE.get_or_init(|| Regex::new(r"^(\d{3,4})p").expect("valid regex"));

    let from_note = format
        .format_note
        .as_deref()
        .and_then(|text| note.captures(text))
        .map(|caps| format!("{}p", &caps[1]))
        .filter(|label| RankScale::Resolution.position(label).is_some());
    if from_note.is_some() {
        return from_note;
    }

    match (format.width, format.height) {
        (Some(width), Some(height)) if width > 0.0 && height > 0.0 => {
            let (short, long) = (width.min(height), width.max(height));
            let nominal = short.max(long * 9.0 / 16.0);
            // small tolerance for encoder padding, e.g. 1920x1088
            RESOLUTIONS
                .iter()
                .find(|rank| rank_height(rank).map_or(false, |h| h <= nominal * 1.02))
                .map(|rank| rank.to_string())
                .or_else(|| Some(format!("{}p", height as u32)))
        }
        (_, Some(height)) => Some(format!("{}p", height as u32)),
        _ => None,
    }
}

fn rank_height(rank: &str) -> Option<f64> {
    rank.strip_suffix('p')?.parse().ok()
}

/// Nominal bitrate labels of the DASH audio itags.
///
/// Measured `abr` values drift around these (e.g. 129.5 for itag 140), so the
/// rank list is matched against the nominal label when one is known. Dubbed
/// and DRC variants carry a suffix (`251-1`, `251-drc`) on the same itag.
fn nominal_bitrate(format_id: &str) -> Option<&'static str> {
    let itag = format_id.split('-').next().unwrap_or(format_id);
    match itag {
        "139" => Some("48kbps"),
        "140" | "171" => Some("128kbps"),
        "141" => Some("256kbps"),
        "249" => Some("50kbps"),
        "250" => Some("70kbps"),
        "251" => Some("160kbps"),
        _ => None,
    }
}

/// Video information with its stream catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub url: String,
    pub duration: Option<u64>,
    pub uploader: Option<String>,
    pub streams: Vec<StreamDescriptor>,
}

/// Playlist information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    pub uploader: Option<String>,
    pub videos: Vec<PlaylistVideo>,
}

/// Individual video in a playlist, in playlist order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistVideo {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// Source of video metadata and stream catalogs
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn video_info(&self, url: &str) -> Result<VideoInfo>;

    async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo>;
}

/// Catalog source backed by yt-dlp
pub struct YouTubeExtractor {
    ytdlp_path: PathBuf,
    timeout_secs: u64,
}

impl YouTubeExtractor {
    pub fn new(ytdlp_path: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            timeout_secs,
        }
    }

    fn command(&self, url: &str) -> YoutubeDl {
        let mut cmd = YoutubeDl::new(url);
        cmd.youtube_dl_path(&self.ytdlp_path);
        if self.timeout_secs > 0 {
            cmd.socket_timeout(self.timeout_secs.to_string());
        }
        cmd
    }
}

impl Default for YouTubeExtractor {
    fn default() -> Self {
        Self::new("yt-dlp", 120)
    }
}

#[async_trait]
impl CatalogSource for YouTubeExtractor {
    async fn video_info(&self, url: &str) -> Result<VideoInfo> {
        info!("Extracting video info for: {}", url);

        let cmd = self.command(url);
        let output = with_timeout("video extraction", self.timeout_secs, async {
            cmd.run_async().await.map_err(Error::from)
        })
        .await?;

        let video = output
            .into_single_video()
            .ok_or_else(|| Error::InvalidInput(format!("{} is not a single video", url)))?;

        let info = video_info_from(video, url);
        debug!("{} streams listed for {}", info.streams.len(), info.id);
        Ok(info)
    }

    async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo> {
        info!("Extracting playlist info for: {}", url);

        let mut cmd = self.command(url);
        cmd.flat_playlist(true);
        let output = with_timeout("playlist extraction", self.timeout_secs, async {
            cmd.run_async().await.map_err(Error::from)
        })
        .await?;

        let playlist = output
            .into_playlist()
            .ok_or_else(|| Error::InvalidInput(format!("{} is not a playlist", url)))?;

        let videos: Vec<PlaylistVideo> = playlist
            .entries
            .unwrap_or_default()
            .into_iter()
            .map(|entry| {
                let url = match entry.url {
                    Some(url) if url.starts_with("http") => url,
                    _ => format!("https://www.youtube.com/watch?v={}", entry.id),
                };
                PlaylistVideo {
                    title: entry.title.unwrap_or_else(|| entry.id.clone()),
                    id: entry.id,
                    url,
                }
            })
            .collect();

        info!("Playlist contains {} videos", videos.len());
        Ok(PlaylistInfo {
            id: playlist.id.unwrap_or_default(),
            title: playlist.title.unwrap_or_else(|| "playlist".to_string()),
            uploader: playlist.uploader,
            videos,
        })
    }
}

fn video_info_from(video: SingleVideo, requested_url: &str) -> VideoInfo {
    let streams = video
        .formats
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(StreamDescriptor::from_format)
        .collect();

    VideoInfo {
        title: video.title.unwrap_or_else(|| video.id.clone()),
        url: video
            .webpage_url
            .unwrap_or_else(|| requested_url.to_string()),
        duration: video
            .duration
            .as_ref()
            .and_then(|d| d.as_f64())
            .map(|d| d as u64),
        uploader: video.uploader,
        id: video.id,
        streams,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(json: serde_json::Value) -> Format {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_video_only_format() {
        let stream = StreamDescriptor::from_format(&format(serde_json::json!({
            "format_id": "248",
            "ext": "webm",
            "vcodec": "vp9",
            "acodec": "none",
            "height": 1080,
            "fps": 30,
            "filesize": 52428800
        })))
        .unwrap();

        assert_eq!(stream.kind, StreamKind::Video);
        assert_eq!(stream.quality_label(), Some("1080p"));
        assert_eq!(stream.container, "webm");
        assert_eq!(stream.size, Some(52_428_800));
        assert_eq!(stream.codec.as_deref(), Some("vp9"));
    }

    #[test]
    fn test_audio_uses_nominal_itag_bitrate() {
        let stream = StreamDescriptor::from_format(&format(serde_json::json!({
            "format_id": "140",
            "ext": "m4a",
            "vcodec": "none",
            "acodec": "mp4a.40.2",
            "abr": 129.478
        })))
        .unwrap();

        assert_eq!(stream.kind, StreamKind::Audio);
        assert_eq!(stream.quality_label(), Some("128kbps"));
        assert_eq!(stream.resolution, None);
    }

    #[test]
    fn test_unknown_audio_itag_rounds_abr() {
        let stream = StreamDescriptor::from_format(&format(serde_json::json!({
            "format_id": "audio-x",
            "ext": "webm",
            "vcodec": "none",
            "acodec": "opus",
            "abr": 69.6
        })))
        .unwrap();
        assert_eq!(stream.bitrate.as_deref(), Some("70kbps"));
    }

    #[test]
    fn test_combined_and_storyboard_formats() {
        let combined = StreamDescriptor::from_format(&format(serde_json::json!({
            "format_id": "18",
            "ext": "mp4",
            "vcodec": "avc1.42001E",
            "acodec": "mp4a.40.2",
            "height": 360
        })))
        .unwrap();
        assert_eq!(combined.kind, StreamKind::Combined);
        assert_eq!(combined.quality_label(), None);

        let storyboard = StreamDescriptor::from_format(&format(serde_json::json!({
            "format_id": "sb0",
            "ext": "mhtml",
            "vcodec": "none",
            "acodec": "none"
        })));
        assert!(storyboard.is_none());
    }

    fn video_format(id: &str, width: u32, height: u32, note: Option<&str>) -> Format {
        let mut json = serde_json::json!({
            "format_id": id,
            "ext": "webm",
            "vcodec": "vp9",
            "acodec": "none",
            "width": width,
            "height": height
        });
        if let Some(note) = note {
            json["format_note"] = serde_json::json!(note);
        }
        format(json)
    }

    fn label_of(format: &Format) -> Option<String> {
        StreamDescriptor::from_format(format).and_then(|s| s.resolution)
    }

    #[test]
    fn test_portrait_and_letterboxed_use_landscape_label() {
        assert_eq!(label_of(&video_format("248", 1080, 1920, Some("1080p"))).as_deref(), Some("1080p"));
        assert_eq!(label_of(&video_format("248", 1920, 800, Some("1080p"))).as_deref(), Some("1080p"));

        // no format_note: derived from the frame dimensions
        assert_eq!(label_of(&video_format("248", 1080, 1920, None)).as_deref(), Some("1080p"));
        assert_eq!(label_of(&video_format("248", 1920, 800, None)).as_deref(), Some("1080p"));
        assert_eq!(label_of(&video_format("244", 854, 480, None)).as_deref(), Some("480p"));
        assert_eq!(label_of(&video_format("137", 1920, 1088, None)).as_deref(), Some("1080p"));
        assert_eq!(label_of(&video_format("160", 144, 256, None)).as_deref(), Some("144p"));
    }

    #[test]
    fn test_frame_rate_is_stripped_from_note() {
        let stream = StreamDescriptor::from_format(&video_format("303", 1920, 1080, Some("1080p60"))).unwrap();
        assert_eq!(stream.quality_label(), Some("1080p"));

        let stream = StreamDescriptor::from_format(&video_format("337", 3840, 2160, Some("2160p60 HDR"))).unwrap();
        assert_eq!(stream.quality_label(), Some("2160p"));

        // notes off the rank list fall back to the dimensions
        let stream = StreamDescriptor::from_format(&video_format("x", 1280, 720, Some("DASH video"))).unwrap();
        assert_eq!(stream.quality_label(), Some("720p"));
    }

    #[test]
    fn test_suffixed_audio_itags_use_nominal_bitrate() {
        for (id, abr, expected) in [
            ("251-1", 135.2, "160kbps"),
            ("251-drc", 141.9, "160kbps"),
            ("140-0", 129.5, "128kbps"),
            ("249-dash", 46.3, "50kbps"),
        ] {
            let stream = StreamDescriptor::from_format(&format(serde_json::json!({
                "format_id": id,
                "ext": "webm",
                "vcodec": "none",
                "acodec": "opus",
                "abr": abr
            })))
            .unwrap();
            assert_eq!(stream.quality_label(), Some(expected), "format {}", id);
            assert_eq!(stream.id, id);
        }
    }

    #[test]
    fn test_selection_over_normalized_portrait_catalog() {
        let catalog: Vec<StreamDescriptor> = [
            video_format("248", 1080, 1920, Some("1080p")),
            video_format("247", 720, 1280, Some("720p")),
            format(serde_json::json!({
                "format_id": "251-drc",
                "ext": "webm",
                "vcodec": "none",
                "acodec": "opus",
                "abr": 141.9
            })),
        ]
        .iter()
        .filter_map(StreamDescriptor::from_format)
        .collect();

        let video = crate::select(
            &catalog,
            crate::QualityFloor::resolution("1080p").unwrap(),
            crate::ContainerFormat::WebM,
        );
        assert_eq!(video.stream().unwrap().id, "248");

        let audio = crate::select(
            &catalog,
            crate::QualityFloor::bitrate("160kbps").unwrap(),
            crate::ContainerFormat::WebM,
        );
        assert_eq!(audio.stream().unwrap().id, "251-drc");
    }
}
