use std::path::PathBuf;
use thiserror::Error;

use crate::{ContainerFormat, QualityFloor};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while discovering, downloading and merging streams
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed URL or an invalid stream selection
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No stream at or below the requested ceiling exists in the chosen format
    #[error("no {format} stream available at or below {floor}")]
    Unsatisfiable {
        floor: QualityFloor,
        format: ContainerFormat,
    },

    /// A stream pinned by format id is not offered in the chosen format
    #[error("stream {0} is not available for this video")]
    MissingStream(String),

    #[error("failed to extract video information: {0}")]
    Extraction(String),

    /// Network or tool failure while transferring a stream
    #[error("stream transfer failed: {0}")]
    Transfer(String),

    /// The muxing executable failed; carries its diagnostic output
    #[error("merge failed: {0}")]
    Merge(String),

    #[error("destination already exists: {}", .0.display())]
    FilesystemConflict(PathBuf),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("location lookup failed: {0}")]
    GeoLookup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<youtube_dl::Error> for Error {
    fn from(err: youtube_dl::Error) -> Self {
        Self::Extraction(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::GeoLookup(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsatisfiable_message_names_floor_and_format() {
        let err = Error::Unsatisfiable {
            floor: QualityFloor::resolution("1080p").unwrap(),
            format: ContainerFormat::WebM,
        };
        assert_eq!(err.to_string(), "no webm stream available at or below 1080p");
    }

    #[test]
    fn conflict_names_the_path() {
        let err = Error::FilesystemConflict(PathBuf::from("/tmp/out.mp4"));
        assert_eq!(err.to_string(), "destination already exists: /tmp/out.mp4");
    }
}
