use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result, StreamDescriptor, StreamKind};

/// Video resolutions, best first
pub const RESOLUTIONS: &[&str] = &[
    "4320p", // 8K
    "2160p", // 4K
    "1440p", // 2K
    "1080p", // Full HD
    "720p",
    "480p",
    "360p",
    "240p",
    "144p",
];

/// Audio bitrates, best first
pub const BITRATES: &[&str] = &["160kbps", "128kbps", "70kbps", "50kbps", "48kbps"];

/// Which ordered rank list a floor is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankScale {
    Resolution,
    Bitrate,
}

impl RankScale {
    pub fn ranks(self) -> &'static [&'static str] {
        match self {
            Self::Resolution => RESOLUTIONS,
            Self::Bitrate => BITRATES,
        }
    }

    /// Stream kind whose quality is measured on this scale
    pub fn kind(self) -> StreamKind {
        match self {
            Self::Resolution => StreamKind::Video,
            Self::Bitrate => StreamKind::Audio,
        }
    }

    /// Position of a label in the rank list, 0 being the best
    pub fn position(self, label: &str) -> Option<usize> {
        self.ranks().iter().position(|rank| *rank == label)
    }
}

/// User ceiling on stream quality.
///
/// Selection walks this rank and every rank below it, never a higher one.
/// Despite the name (kept from the prompts users see), a floor acts as a
/// ceiling with downward fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QualityFloor {
    scale: RankScale,
    index: usize,
}

impl QualityFloor {
    /// Build a floor from a label of the given scale.
    ///
    /// Unknown labels are a configuration error, not a data error.
    pub fn new(scale: RankScale, label: &str) -> Result<Self> {
        let index = scale.position(label).ok_or_else(|| {
            Error::Config(format!(
                "'{}' is not a known rank (expected one of {})",
                label,
                scale.ranks().join(", ")
            ))
        })?;
        Ok(Self { scale, index })
    }

    pub fn resolution(label: &str) -> Result<Self> {
        Self::new(RankScale::Resolution, label)
    }

    pub fn bitrate(label: &str) -> Result<Self> {
        Self::new(RankScale::Bitrate, label)
    }

    /// The best rank of a scale
    pub fn highest(scale: RankScale) -> Self {
        Self { scale, index: 0 }
    }

    pub fn scale(&self) -> RankScale {
        self.scale
    }

    pub fn label(&self) -> &'static str {
        self.scale.ranks()[self.index]
    }

    /// This rank and every lower one, best first
    pub fn candidates(&self) -> &'static [&'static str] {
        &self.scale.ranks()[self.index..]
    }
}

impl fmt::Display for QualityFloor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Container format shared by the video and audio streams of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    WebM,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 2] = [ContainerFormat::WebM, ContainerFormat::Mp4];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::WebM => "webm",
        }
    }

    /// Whether a stream container subtype belongs to this format family.
    ///
    /// yt-dlp reports mp4 audio tracks as `m4a` and webm audio as `webm` or `weba`.
    pub fn accepts(self, container: &str) -> bool {
        let container = container.to_ascii_lowercase();
        match self {
            Self::Mp4 => matches!(container.as_str(), "mp4" | "m4a"),
            Self::WebM => matches!(container.as_str(), "webm" | "weba"),
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContainerFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::WebM),
            other => Err(Error::InvalidInput(format!("unsupported format: {}", other))),
        }
    }
}

/// Typed predicate over stream descriptors
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFilter {
    Kind(StreamKind),
    Container(ContainerFormat),
    Quality(String),
    All(Vec<StreamFilter>),
}

impl StreamFilter {
    pub fn kind(kind: StreamKind) -> Self {
        Self::Kind(kind)
    }

    pub fn container(format: ContainerFormat) -> Self {
        Self::Container(format)
    }

    pub fn quality(label: impl Into<String>) -> Self {
        Self::Quality(label.into())
    }

    /// Streams of one kind in one container family
    pub fn for_selection(kind: StreamKind, format: ContainerFormat) -> Self {
        Self::kind(kind).and(Self::container(format))
    }

    pub fn and(self, other: StreamFilter) -> Self {
        match (self, other) {
            (Self::All(mut left), Self::All(right)) => {
                left.extend(right);
                Self::All(left)
            }
            (Self::All(mut left), other) => {
                left.push(other);
                Self::All(left)
            }
            (this, Self::All(mut right)) => {
                right.insert(0, this);
                Self::All(right)
            }
            (this, other) => Self::All(vec![this, other]),
        }
    }

    pub fn matches(&self, stream: &StreamDescriptor) -> bool {
        match self {
            Self::Kind(kind) => stream.kind == *kind,
            Self::Container(format) => format.accepts(&stream.container),
            Self::Quality(label) => stream.quality_label() == Some(label.as_str()),
            Self::All(filters) => filters.iter().all(|f| f.matches(stream)),
        }
    }

    /// Matching streams in catalog order
    pub fn apply<'a>(
        &'a self,
        catalog: &'a [StreamDescriptor],
    ) -> impl Iterator<Item = &'a StreamDescriptor> + 'a {
        catalog.iter().filter(move |stream| self.matches(stream))
    }
}

/// Outcome of a quality-constrained selection
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionResult {
    Selected(StreamDescriptor),
    Unsatisfiable {
        floor: QualityFloor,
        format: ContainerFormat,
    },
}

impl SelectionResult {
    pub fn into_result(self) -> Result<StreamDescriptor> {
        match self {
            Self::Selected(stream) => Ok(stream),
            Self::Unsatisfiable { floor, format } => Err(Error::Unsatisfiable { floor, format }),
        }
    }

    pub fn stream(&self) -> Option<&StreamDescriptor> {
        match self {
            Self::Selected(stream) => Some(stream),
            Self::Unsatisfiable { .. } => None,
        }
    }
}

/// Pick the best stream at or below `floor` in the given container format.
///
/// The stream kind follows the floor's scale (resolution picks video-only
/// streams, bitrate picks audio-only streams); combined streams never match.
/// Ranks are tried from the floor downwards and the first catalog entry
/// carrying a rank wins, so ties resolve to catalog order.
pub fn select(
    catalog: &[StreamDescriptor],
    floor: QualityFloor,
    format: ContainerFormat,
) -> SelectionResult {
    let filter = StreamFilter::for_selection(floor.scale().kind(), format);
    let eligible: Vec<&StreamDescriptor> = filter.apply(catalog).collect();

    for rank in floor.candidates() {
        if let Some(stream) = eligible
            .iter()
            .find(|stream| stream.quality_label() == Some(*rank))
        {
            return SelectionResult::Selected((*stream).clone());
        }
    }

    SelectionResult::Unsatisfiable { floor, format }
}

/// Filtered catalog ordered best first for display.
///
/// Streams whose label is not on the scale go last; ties keep catalog order.
pub fn rank_catalog<'a>(
    catalog: &'a [StreamDescriptor],
    filter: &StreamFilter,
    scale: RankScale,
) -> Vec<&'a StreamDescriptor> {
    let mut ranked: Vec<&StreamDescriptor> =
        catalog.iter().filter(|stream| filter.matches(stream)).collect();
    ranked.sort_by_key(|stream| {
        stream
            .quality_label()
            .and_then(|label| scale.position(label))
            .unwrap_or(usize::MAX)
    });
    ranked
}

/// Streams offered by every catalog, matched by format id.
///
/// Descriptors come from the first catalog and keep its order.
pub fn common_streams(catalogs: &[Vec<StreamDescriptor>], filter: &StreamFilter) -> Vec<StreamDescriptor> {
    let Some((first, rest)) = catalogs.split_first() else {
        return Vec::new();
    };
    filter
        .apply(first)
        .filter(|stream| {
            rest.iter()
                .all(|catalog| filter.apply(catalog).any(|other| other.id == stream.id))
        })
        .cloned()
        .collect()
}
