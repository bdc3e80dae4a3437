mod args;
mod prompt;
mod ui;

use anyhow::{bail, Context, Result};
use args::Cli;
use clap::Parser;
use prompt::{SelectionMode, Target};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tubemux_core::*;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            ui::print_separator();
            ui::print_error(&format!("Error: {:#}", err));
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the session ended without failures
async fn run(cli: Cli) -> Result<bool> {
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!("Configuration: {:?}", config);

    if config.clear_console {
        ui::clear_console();
    }
    ui::print_separator();

    if config.geo_check.enabled {
        if !check_location_allowed(&config.geo_check).await {
            return Ok(false);
        }
        ui::print_separator();
    }

    let tubemux = TubeMux::from_config(&config);
    let tools = tubemux.check_tools().await;
    if !tools.ytdlp {
        bail!("yt-dlp was not found at {}", config.ytdlp_path.display());
    }
    if !tools.ffmpeg {
        bail!("ffmpeg was not found at {}", config.ffmpeg_path.display());
    }

    let url = prompt::ask_url()?;
    ui::print_separator();

    let target = prompt::ask_target(&url)?;
    ui::print_separator();

    let success = match target {
        Target::Video => {
            download_video(&tubemux, &config, &url).await?;
            true
        }
        Target::Playlist => download_playlist(&tubemux, &config, &url).await?,
    };
    ui::print_separator();
    Ok(success)
}

async fn check_location_allowed(config: &GeoCheckConfig) -> bool {
    let spinner = ui::create_spinner("Checking public IP location...");
    let result = check_location(config).await;
    spinner.finish_and_clear();

    match result {
        Ok(GeoVerdict::Allowed(report)) => {
            ui::print_success(&format!("You are in {} ({})", report.country, report.ip));
            true
        }
        Ok(GeoVerdict::Blocked(report)) => {
            ui::print_error(&format!(
                "You are in {} ({})! Please connect to a VPN.",
                report.country, report.ip
            ));
            false
        }
        Err(err) => {
            ui::print_warning(&format!("Could not check IP location: {}", err));
            true
        }
    }
}

async fn download_video(tubemux: &TubeMux, config: &AppConfig, url: &str) -> Result<()> {
    let spinner = ui::create_spinner("Fetching video information...");
    let info = tubemux.video_info(url).await;
    spinner.finish_and_clear();
    let info = info.context("failed to read video information")?;

    ui::print_video_info(&info);
    ui::print_separator();

    let format = prompt::ask_format(config.default_format)?;
    ui::print_separator();

    let (video_stream, audio_stream) = match prompt::ask_selection_mode()? {
        SelectionMode::Automatic => {
            let resolution = prompt::ask_ceiling(RankScale::Resolution)?;
            let bitrate = prompt::ask_ceiling(RankScale::Bitrate)?;
            let video = select(&info.streams, resolution, format).into_result()?;
            let audio = select(&info.streams, bitrate, format).into_result()?;
            ui::print_info(&format!("Video stream: {}", ui::stream_label(&video)));
            ui::print_info(&format!("Audio stream: {}", ui::stream_label(&audio)));
            (video, audio)
        }
        SelectionMode::Manual => {
            let videos = rank_catalog(
                &info.streams,
                &StreamFilter::for_selection(StreamKind::Video, format),
                RankScale::Resolution,
            );
            let video = prompt::choose_stream(&videos, StreamKind::Video)?;
            ui::print_separator();

            let audios = rank_catalog(
                &info.streams,
                &StreamFilter::for_selection(StreamKind::Audio, format),
                RankScale::Bitrate,
            );
            let audio = prompt::choose_stream(&audios, StreamKind::Audio)?;
            (video, audio)
        }
    };
    ui::print_separator();

    let (destination_dir, file_name) = prompt::ask_output_file(
        &file_slug(&info.title),
        &video_stream.container,
        &config.default_output_dir,
    )?;
    ui::print_separator();

    let job = DownloadJob {
        video_id: info.id.clone(),
        video_url: info.url.clone(),
        video_stream,
        audio_stream,
        destination_dir,
        file_name,
    };

    let bars = ui::TransferBars::new();
    let result = tubemux.download(&job, &|progress| bars.update(progress)).await;
    bars.finish();
    let output = result.context("error during download or merge")?;

    ui::print_separator();
    ui::print_success(&format!("Merged file saved to: {}", output.display()));
    ui::print_success("Done");
    Ok(())
}

async fn download_playlist(tubemux: &TubeMux, config: &AppConfig, url: &str) -> Result<bool> {
    let spinner = ui::create_spinner("Fetching playlist...");
    let playlist = tubemux.playlist_info(url).await;
    spinner.finish_and_clear();
    let playlist = playlist.context("failed to read playlist")?;

    println!("📃 {} ({} videos)", playlist.title, playlist.videos.len());
    if playlist.videos.is_empty() {
        ui::print_warning("The playlist has no videos.");
        return Ok(true);
    }
    ui::print_separator();

    let format = prompt::ask_format(config.default_format)?;
    ui::print_separator();

    let constraints = match prompt::ask_selection_mode()? {
        SelectionMode::Automatic => {
            let resolution = prompt::ask_ceiling(RankScale::Resolution)?;
            let bitrate = prompt::ask_ceiling(RankScale::Bitrate)?;
            QualityConstraints::ceiling(resolution, bitrate, format)
        }
        SelectionMode::Manual => pin_common_streams(tubemux, &playlist.videos, format).await?,
    };
    ui::print_separator();

    let default_dir = PathBuf::from(".").join(file_slug(&playlist.title));
    let destination_dir = prompt::ask_playlist_dir(&default_dir)?;

    let run = PlaylistRun {
        videos: playlist.videos,
        destination_dir,
        constraints,
    };

    let total = run.videos.len();
    let current = Mutex::new(None::<ui::TransferBars>);
    let on_event = |event: PlaylistEvent| match event {
        PlaylistEvent::Started { position, total, title } => {
            ui::print_separator();
            ui::print_info(&format!("[{}/{}] {}", position, total, title));
            *lock(&current) = Some(ui::TransferBars::new());
        }
        PlaylistEvent::Transfer { progress, .. } => {
            if let Some(bars) = lock(&current).as_ref() {
                bars.update(progress);
            }
        }
        PlaylistEvent::Finished { position, outcome } => {
            lock(&current).take();
            ui::print_outcome(position, total, &outcome);
        }
    };

    let summary = tubemux.run_playlist(&run, &on_event).await?;
    ui::print_separator();
    ui::print_summary(&summary);
    Ok(summary.is_success())
}

/// Let the user pick one video and one audio stream offered by every video
async fn pin_common_streams(
    tubemux: &TubeMux,
    videos: &[PlaylistVideo],
    format: ContainerFormat,
) -> Result<QualityConstraints> {
    let spinner = ui::create_spinner("Fetching stream lists...");
    let mut catalogs = Vec::with_capacity(videos.len());
    for (index, video) in videos.iter().enumerate() {
        spinner.set_message(format!("Fetching stream lists... [{}/{}]", index + 1, videos.len()));
        match tubemux.video_info(&video.url).await {
            Ok(info) => catalogs.push(info.streams),
            Err(err) => {
                spinner.suspend(|| ui::print_warning(&format!("Ignoring {}: {}", video.title, err)))
            }
        }
    }
    spinner.finish_and_clear();

    let common = |kind: StreamKind, scale: RankScale| -> Vec<StreamDescriptor> {
        let streams = common_streams(&catalogs, &StreamFilter::for_selection(kind, format));
        rank_catalog(&streams, &StreamFilter::kind(kind), scale)
            .into_iter()
            .cloned()
            .collect()
    };
    let video_streams = common(StreamKind::Video, RankScale::Resolution);
    let audio_streams = common(StreamKind::Audio, RankScale::Bitrate);
    if video_streams.is_empty() || audio_streams.is_empty() {
        bail!("The playlist videos share no {} video and audio streams", format);
    }

    let video = prompt::choose_stream(&video_streams.iter().collect::<Vec<_>>(), StreamKind::Video)?;
    ui::print_separator();
    let audio = prompt::choose_stream(&audio_streams.iter().collect::<Vec<_>>(), StreamKind::Audio)?;
    Ok(QualityConstraints::pinned(video.id, audio.id, format))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
