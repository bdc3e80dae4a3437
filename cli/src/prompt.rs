use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::path::{Path, PathBuf};
use tubemux_core::{
    is_playlist_url, is_valid_youtube_url, ContainerFormat, QualityFloor, RankScale,
    StreamDescriptor, StreamKind,
};

use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Video,
    Playlist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Best stream at or below a chosen ceiling
    Automatic,
    /// Pick streams from the full list
    Manual,
}

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

pub fn ask_url() -> Result<String> {
    let url: String = Input::with_theme(&theme())
        .with_prompt("Please enter a YouTube URL")
        .validate_with(|input: &String| -> Result<(), &str> {
            if is_valid_youtube_url(input) {
                Ok(())
            } else {
                Err("Not a YouTube URL")
            }
        })
        .interact_text()?;
    Ok(url.trim().to_string())
}

pub fn ask_target(url: &str) -> Result<Target> {
    let default = if is_playlist_url(url) { 1 } else { 0 };
    let choice = Select::with_theme(&theme())
        .with_prompt("Is this a video or playlist?")
        .items(&["Video", "Playlist"])
        .default(default)
        .interact()?;
    Ok(if choice == 1 { Target::Playlist } else { Target::Video })
}

pub fn ask_format(default: ContainerFormat) -> Result<ContainerFormat> {
    let formats = ContainerFormat::ALL;
    let default = formats.iter().position(|f| *f == default).unwrap_or(0);
    let choice = Select::with_theme(&theme())
        .with_prompt("Please select a format")
        .items(&formats)
        .default(default)
        .interact()?;
    Ok(formats[choice])
}

pub fn ask_selection_mode() -> Result<SelectionMode> {
    let choice = Select::with_theme(&theme())
        .with_prompt("How should streams be chosen?")
        .items(&["Best available up to a maximum quality", "Pick streams manually"])
        .default(0)
        .interact()?;
    Ok(if choice == 1 { SelectionMode::Manual } else { SelectionMode::Automatic })
}

/// Ask for the highest acceptable quality on a scale
pub fn ask_ceiling(scale: RankScale) -> Result<QualityFloor> {
    let prompt = match scale {
        RankScale::Resolution => {
            "Please select a maximum resolution (if it's not available, a lower resolution will be used)"
        }
        RankScale::Bitrate => {
            "Please select a maximum bitrate (if it's not available, a lower bitrate will be used)"
        }
    };
    let ranks = scale.ranks();
    let choice = Select::with_theme(&theme())
        .with_prompt(prompt)
        .items(ranks)
        .default(0)
        .interact()?;
    Ok(QualityFloor::new(scale, ranks[choice])?)
}

/// Let the user pick one stream from an already filtered and ranked list
pub fn choose_stream(streams: &[&StreamDescriptor], kind: StreamKind) -> Result<StreamDescriptor> {
    let noun = match kind {
        StreamKind::Audio => "audio",
        _ => "video",
    };
    if streams.is_empty() {
        bail!("No {} streams available.", noun);
    }

    let options: Vec<String> = streams.iter().map(|s| ui::stream_label(s)).collect();
    let choice = Select::with_theme(&theme())
        .with_prompt(format!("Please select a {} stream", noun))
        .items(&options)
        .default(0)
        .interact()?;
    Ok(streams[choice].clone())
}

pub fn ask_yes_no(question: &str) -> Result<bool> {
    Ok(Confirm::with_theme(&theme())
        .with_prompt(question)
        .default(false)
        .interact()?)
}

/// Ask for a file name and directory until the target path is free.
///
/// An existing file is only removed after the user agrees; otherwise both
/// questions are asked again.
pub fn ask_output_file(
    default_name: &str,
    extension: &str,
    default_dir: &Path,
) -> Result<(PathBuf, String)> {
    loop {
        let name: String = Input::with_theme(&theme())
            .with_prompt("Please enter a file name")
            .default(default_name.to_string())
            .validate_with(|input: &String| -> Result<(), &str> {
                if input.trim().is_empty() || input.contains(['/', '\\']) {
                    Err("Enter a plain file name")
                } else {
                    Ok(())
                }
            })
            .interact_text()?;
        let dir = ask_path("Please enter a directory", default_dir)?;
        let file_name = format!("{}.{}", name.trim(), extension);
        let path = dir.join(&file_name);

        if !path.exists() {
            return Ok((dir, file_name));
        }
        if path.is_file()
            && ask_yes_no(&format!(
                "File {} already exists. Do you want to remove it?",
                path.display()
            ))?
        {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            return Ok((dir, file_name));
        }
    }
}

/// Ask for the playlist directory; an existing one is reused only on request
pub fn ask_playlist_dir(default_dir: &Path) -> Result<PathBuf> {
    loop {
        let dir = ask_path("Please enter a directory", default_dir)?;
        if !dir.exists() {
            return Ok(dir);
        }
        if dir.is_dir()
            && ask_yes_no(&format!(
                "Directory {} already exists. Do you want to update it?",
                dir.display()
            ))?
        {
            return Ok(dir);
        }
    }
}

fn ask_path(prompt: &str, default: &Path) -> Result<PathBuf> {
    let value: String = Input::with_theme(&theme())
        .with_prompt(prompt)
        .default(default.display().to_string())
        .interact_text()?;
    Ok(expand_home(value.trim()))
}

/// Expand a leading `~` to the home directory
fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(value),
        },
        _ => PathBuf::from(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("./videos"), PathBuf::from("./videos"));
        assert_eq!(expand_home("~user/videos"), PathBuf::from("~user/videos"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/videos"), home.join("videos"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
