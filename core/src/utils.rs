use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::{Error, Result};

/// Normalize a title into a lowercase, filesystem-safe slug.
///
/// Accents are decomposed and dropped, anything that is not a word character,
/// whitespace or hyphen is removed, and runs of whitespace/hyphens collapse to
/// a single hyphen. Leading and trailing hyphens and underscores are trimmed.
pub fn slugify(value: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();

    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();

    let invalid = INVALID.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[-\s]+").expect("valid regex"));

    let cleaned = invalid.replace_all(&lowered, "");
    let collapsed = separators.replace_all(&cleaned, "-");
    collapsed.trim_matches(|c: char| c == '-' || c == '_').to_string()
}

/// Slug that is never empty, for use in filenames
pub fn file_slug(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Validate YouTube URL format
pub fn is_valid_youtube_url(url: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^https?://(?:(?:www\.|m\.)?youtube\.com/.+|youtu\.be/[\w-]+)")
                .expect("valid regex")
        })
        .is_match(url.trim())
}

/// Whether a URL points at a playlist rather than a single video
pub fn is_playlist_url(url: &str) -> bool {
    url.contains("youtube.com/playlist") || (url.contains("list=") && !url.contains("v="))
}

/// Short random token for per-job temporary file names
pub fn temp_token() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Await `future`, failing with [`Error::Timeout`] after `seconds`.
///
/// A zero timeout waits indefinitely.
pub async fn with_timeout<F, T>(operation: &'static str, seconds: u64, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if seconds == 0 {
        return future.await;
    }
    tokio::time::timeout(Duration::from_secs(seconds), future)
        .await
        .map_err(|_| Error::Timeout { operation, seconds })?
}

/// Format duration from seconds to human-readable format
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format bytes as human-readable size
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Café  del   Mar -- Live "), "cafe-del-mar-live");
        assert_eq!(slugify("_Rust & Go_"), "rust-go");
        assert_eq!(slugify("日本語"), "");
        assert_eq!(file_slug("日本語"), "untitled");
    }

    #[test]
    fn test_validate_youtube_url() {
        assert!(is_valid_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_valid_youtube_url("https://m.youtube.com/playlist?list=PL123"));
        assert!(is_valid_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(!is_valid_youtube_url("https://example.com"));
        assert!(!is_valid_youtube_url("youtube.com/watch?v=x"));
    }

    #[test]
    fn test_playlist_detection() {
        assert!(is_playlist_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(!is_playlist_url("https://www.youtube.com/watch?v=abc&list=PL123"));
    }

    #[test]
    fn test_temp_token_is_short_and_unique() {
        let a = temp_token();
        let b = temp_token();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(65), "01:05");
        assert_eq!(format_duration(3661), "01:01:01");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("sleep", 1, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout { seconds: 1, .. })));
    }

    #[tokio::test]
    async fn test_zero_timeout_waits() {
        let value = with_timeout("noop", 0, async { Ok::<_, Error>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
