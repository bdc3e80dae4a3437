use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{ContainerFormat, Error, FailurePolicy, Result};

const ENV_PREFIX: &str = "TUBEMUX";

/// Application configuration.
///
/// Layered as built-in defaults, then the TOML config file, then
/// `TUBEMUX_*` environment variables (`__` separates nested keys, e.g.
/// `TUBEMUX_GEO_CHECK__ENABLED=true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub default_output_dir: PathBuf,
    pub default_format: ContainerFormat,
    /// Timeouts in seconds; 0 disables the timeout
    pub extract_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub merge_timeout_secs: u64,
    /// Download the video and audio streams of one job concurrently
    pub parallel_streams: bool,
    pub on_failure: FailurePolicy,
    pub clear_console: bool,
    pub geo_check: GeoCheckConfig,
}

/// Optional public-IP location advisory run before anything else
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoCheckConfig {
    pub enabled: bool,
    /// Endpoint answering `{"ip": "...", "country": "..."}`
    pub endpoint: String,
    /// Countries (name or ISO code) where startup is aborted
    pub blocked_countries: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for GeoCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://ipinfo.io/json".to_string(),
            blocked_countries: vec!["IR".to_string(), "Iran".to_string()],
            timeout_secs: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            default_output_dir: default_output_dir(),
            default_format: ContainerFormat::WebM,
            extract_timeout_secs: 120,
            download_timeout_secs: 3600,
            merge_timeout_secs: 600,
            parallel_streams: false,
            on_failure: FailurePolicy::Continue,
            clear_console: true,
            geo_check: GeoCheckConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; otherwise the default config file is
    /// read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();
        let geo = &defaults.geo_check;

        let mut builder = Config::builder()
            .set_default("ytdlp_path", path_value(&defaults.ytdlp_path))?
            .set_default("ffmpeg_path", path_value(&defaults.ffmpeg_path))?
            .set_default("default_output_dir", path_value(&defaults.default_output_dir))?
            .set_default("default_format", defaults.default_format.extension())?
            .set_default("extract_timeout_secs", defaults.extract_timeout_secs as i64)?
            .set_default("download_timeout_secs", defaults.download_timeout_secs as i64)?
            .set_default("merge_timeout_secs", defaults.merge_timeout_secs as i64)?
            .set_default("parallel_streams", defaults.parallel_streams)?
            .set_default("on_failure", defaults.on_failure.as_str())?
            .set_default("clear_console", defaults.clear_console)?
            .set_default("geo_check.enabled", geo.enabled)?
            .set_default("geo_check.endpoint", geo.endpoint.clone())?
            .set_default("geo_check.blocked_countries", geo.blocked_countries.clone())?
            .set_default("geo_check.timeout_secs", geo.timeout_secs as i64)?;

        match path {
            Some(path) => {
                debug!("Loading config file {}", path.display());
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(path) = default_config_path() {
                    debug!("Looking for config file {}", path.display());
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ytdlp_path.as_os_str().is_empty() {
            return Err(Error::Config("ytdlp_path must not be empty".to_string()));
        }
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(Error::Config("ffmpeg_path must not be empty".to_string()));
        }
        if self.geo_check.enabled && self.geo_check.endpoint.trim().is_empty() {
            return Err(Error::Config(
                "geo_check.endpoint is required when the check is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/tubemux/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tubemux").join("config.toml"))
}

fn default_output_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("yt-dl")
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
default_format = "mp4"
merge_timeout_secs = 0
on_failure = "abort"

[geo_check]
enabled = true
blocked_countries = ["XX"]
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.default_format, ContainerFormat::Mp4);
        assert_eq!(config.merge_timeout_secs, 0);
        assert_eq!(config.on_failure, FailurePolicy::Abort);
        assert!(config.geo_check.enabled);
        assert_eq!(config.geo_check.blocked_countries, vec!["XX".to_string()]);
        assert_eq!(config.geo_check.endpoint, "https://ipinfo.io/json");
        assert_eq!(config.ytdlp_path, PathBuf::from("yt-dlp"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/tubemux.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        config.ffmpeg_path = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
