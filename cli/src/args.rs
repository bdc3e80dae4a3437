use clap::Parser;
use std::path::PathBuf;

/// Everything else is asked interactively
#[derive(Parser, Debug)]
#[command(name = "tubemux")]
#[command(about = "Download YouTube videos and playlists as merged video + audio files")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file (default: <config dir>/tubemux/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["tubemux"]);
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::parse_from(["tubemux", "-v", "--config", "/tmp/tubemux.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/tubemux.toml")));
    }

    #[test]
    fn test_rejects_positional_arguments() {
        assert!(Cli::try_parse_from(["tubemux", "https://youtu.be/x"]).is_err());
    }
}
