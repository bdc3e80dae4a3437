use colored::*;
use console::Term;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tubemux_core::{
    format_bytes, format_duration, PlaylistSummary, StreamDescriptor, StreamKind, TransferProgress,
    VideoInfo, VideoOutcome,
};

const SEPARATOR_WIDTH: usize = 100;

pub fn clear_console() {
    // not a terminal: nothing to clear
    let _ = Term::stdout().clear_screen();
}

pub fn print_separator() {
    println!("{}", "-".repeat(SEPARATOR_WIDTH).dimmed());
}

pub fn print_success(message: &str) {
    println!("{}", message.green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", message.red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", message.blue().bold());
}

pub fn print_warning(message: &str) {
    println!("{}", message.yellow().bold());
}

pub fn print_video_info(info: &VideoInfo) {
    println!("📹 {}", info.title.green());
    if let Some(duration) = info.duration {
        println!("⏱️  Duration: {}", format_duration(duration));
    }
    if let Some(uploader) = &info.uploader {
        println!("👤 Uploader: {}", uploader);
    }
}

/// `137: 1080p - 145.2 MB - (mp4) - (avc1.640028)`
pub fn stream_label(stream: &StreamDescriptor) -> String {
    let quality = stream.quality_label().unwrap_or("?");
    let size = stream
        .size
        .map(format_bytes)
        .unwrap_or_else(|| "unknown size".to_string());
    let mut label = format!("{}: {}", stream.id, quality);
    if let Some(fps) = stream.fps.filter(|fps| *fps > 0.0 && stream.kind == StreamKind::Video) {
        label.push_str(&format!(" {}fps", fps.round() as u32));
    }
    label.push_str(&format!(" - {} - ({})", size, stream.container));
    if let Some(codec) = &stream.codec {
        label.push_str(&format!(" - ({})", codec));
    }
    label
}

pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn transfer_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg:>6} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .map(|style| style.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// One byte progress bar per stream of the running job
pub struct TransferBars {
    multi: MultiProgress,
    bars: Mutex<HashMap<StreamKind, ProgressBar>>,
}

impl TransferBars {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    pub fn update(&self, progress: TransferProgress) {
        let mut bars = self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let bar = bars.entry(progress.kind).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(progress.total.unwrap_or(0)));
            bar.set_style(transfer_style());
            bar.set_message(match progress.kind {
                StreamKind::Video => "video",
                StreamKind::Audio => "audio",
                StreamKind::Combined => "stream",
            });
            bar
        });
        if let Some(total) = progress.total {
            bar.set_length(total);
        }
        bar.set_position(progress.downloaded);
    }

    pub fn finish(&self) {
        let mut bars = self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for (_, bar) in bars.drain() {
            bar.finish();
        }
    }
}

impl Default for TransferBars {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TransferBars {
    fn drop(&mut self) {
        self.finish();
    }
}

pub fn print_outcome(position: usize, total: usize, outcome: &VideoOutcome) {
    let prefix = format!("[{}/{}]", position, total);
    match outcome {
        VideoOutcome::Downloaded(path) => {
            print_success(&format!("{} Merged file saved to: {}", prefix, path.display()))
        }
        VideoOutcome::Skipped(path) => {
            print_info(&format!("{} Already downloaded: {}", prefix, path.display()))
        }
        VideoOutcome::Unsatisfiable(reason) => print_warning(&format!("{} Skipped: {}", prefix, reason)),
        VideoOutcome::Failed(reason) => print_error(&format!("{} Failed: {}", prefix, reason)),
    }
}

pub fn print_summary(summary: &PlaylistSummary) {
    let line = format!(
        "✅ Completed: {} downloaded, {} already present, {} unavailable, {} failed",
        summary.downloaded(),
        summary.skipped(),
        summary.unsatisfiable(),
        summary.failed()
    );
    if summary.is_success() {
        print_success(&line);
    } else {
        print_error(&line);
    }
    if summary.aborted {
        print_error(&format!(
            "Stopped after the first failure; {} of {} videos were not processed",
            summary.total - summary.reports.len(),
            summary.total
        ));
    }
}
