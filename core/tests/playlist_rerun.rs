use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tubemux_core::{
    CatalogSource, ContainerFormat, DownloadOrchestrator, Error, FailurePolicy, Muxer,
    PlaylistDriver, PlaylistInfo, PlaylistRun, PlaylistVideo, ProgressFn, QualityConstraints,
    QualityFloor, Result, StreamDescriptor, StreamDownloader, StreamKind, TransferProgress,
    VideoInfo, VideoOutcome,
};

struct StaticCatalog;

fn descriptor(id: &str, kind: StreamKind, container: &str) -> StreamDescriptor {
    StreamDescriptor {
        id: id.to_string(),
        kind,
        resolution: (kind == StreamKind::Video).then(|| "1080p".to_string()),
        bitrate: (kind == StreamKind::Audio).then(|| "128kbps".to_string()),
        container: container.to_string(),
        size: Some(4),
        codec: None,
        fps: None,
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn video_info(&self, url: &str) -> Result<VideoInfo> {
        Ok(VideoInfo {
            id: url.rsplit('=').next().unwrap_or(url).to_string(),
            title: url.to_string(),
            url: url.to_string(),
            duration: Some(60),
            uploader: None,
            streams: vec![
                descriptor("18", StreamKind::Combined, "mp4"),
                descriptor("137", StreamKind::Video, "mp4"),
                descriptor("140", StreamKind::Audio, "m4a"),
            ],
        })
    }

    async fn playlist_info(&self, url: &str) -> Result<PlaylistInfo> {
        Err(Error::InvalidInput(format!("unexpected playlist lookup for {}", url)))
    }
}

#[derive(Default)]
struct CountingDownloader {
    calls: AtomicUsize,
}

#[async_trait]
impl StreamDownloader for CountingDownloader {
    async fn download(
        &self,
        _video_url: &str,
        stream: &StreamDescriptor,
        destination: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(destination, b"data").await?;
        progress(TransferProgress {
            kind: stream.kind,
            downloaded: 4,
            total: Some(4),
        });
        Ok(())
    }
}

struct ConcatMuxer;

#[async_trait]
impl Muxer for ConcatMuxer {
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        let mut merged = tokio::fs::read(video).await?;
        merged.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

fn videos() -> Vec<PlaylistVideo> {
    ["Intro: Getting Started", "Ownership & Borrowing", "Async Rust"]
        .iter()
        .enumerate()
        .map(|(i, title)| PlaylistVideo {
            id: format!("vid{}", i),
            title: title.to_string(),
            url: format!("https://www.youtube.com/watch?v=vid{}", i),
        })
        .collect()
}

#[tokio::test]
async fn rerunning_a_playlist_downloads_nothing() {
    let dir = TempDir::new().unwrap();
    let downloader = Arc::new(CountingDownloader::default());
    let orchestrator = DownloadOrchestrator::new(downloader.clone(), Arc::new(ConcatMuxer));
    let driver = PlaylistDriver::new(
        Arc::new(StaticCatalog),
        Arc::new(orchestrator),
        FailurePolicy::Continue,
    );

    let run = PlaylistRun {
        videos: videos(),
        destination_dir: dir.path().join("rust-course"),
        constraints: QualityConstraints::ceiling(
            QualityFloor::resolution("1080p").unwrap(),
            QualityFloor::bitrate("160kbps").unwrap(),
            ContainerFormat::Mp4,
        ),
    };

    let first = driver.run(&run, &|_| {}).await.unwrap();
    assert_eq!(first.downloaded(), 3);
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 6);

    let mut names: Vec<String> = std::fs::read_dir(&run.destination_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "001-intro-getting-started.mp4",
            "002-ownership-borrowing.mp4",
            "003-async-rust.mp4",
        ]
    );

    let second = driver.run(&run, &|_| {}).await.unwrap();
    assert_eq!(second.skipped(), 3);
    assert!(second.is_success());
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 6);
    assert!(second
        .reports
        .iter()
        .all(|report| matches!(report.outcome, VideoOutcome::Skipped(_))));
}
