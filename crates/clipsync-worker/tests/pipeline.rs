//! End-to-end runs against stand-in encoder binaries and a mock YouTube.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clipsync_media::Toolchain;
use clipsync_worker::aggregator;
use clipsync_worker::{LogAggregator, Orchestrator, PipelineConfig, RunSummary, WorkerLogger, WorkerResult};
use clipsync_youtube::{RetryPolicy, YoutubeConfig};
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers every probe with 1000 frames.
const FAKE_FFPROBE: &str = r#"#!/bin/sh
echo '{"streams":[{"nb_frames":"1000"}]}'
"#;

/// Writes a 2 MiB output and reports progress like `-progress pipe:2`.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
for out; do :; done
if [ -e "$out" ]; then
  echo "File '$out' already exists. Exiting." >&2
  exit 1
fi
head -c 2097152 /dev/zero > "$out"
for n in 250 500 1000; do
  echo "frame=$n" >&2
  echo "progress=continue" >&2
done
echo "progress=end" >&2
"#;

/// Writes part of an output and then hangs until killed.
const HANGING_FFMPEG: &str = r#"#!/bin/sh
for out; do :; done
head -c 4096 /dev/zero > "$out"
echo "frame=10" >&2
exec sleep 30
"#;

struct Library {
    dir: TempDir,
}

impl Library {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    fn add_source(&self, name: &str) -> PathBuf {
        let path = self.root().join("Game").join("lossless").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![7u8; 256]).unwrap();
        path
    }

    fn target(&self, name: &str) -> PathBuf {
        self.root().join("Game").join("AV1").join(name)
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join("bin").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(&self, ffmpeg_body: &str) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.root());
        config.encoder.toolchain = Toolchain {
            ffmpeg: self.script("ffmpeg", ffmpeg_body),
            ffprobe: self.script("ffprobe", FAKE_FFPROBE),
        };
        config.youtube.credentials_path = self.dir.path().join("token.json");
        config
    }

    fn write_credentials(&self) {
        std::fs::write(
            self.dir.path().join("token.json"),
            r#"{"access_token": "test-token"}"#,
        )
        .unwrap();
    }
}

/// Run one pass with an in-memory run log.
async fn run_pipeline(
    config: PipelineConfig,
    cancel_rx: Option<watch::Receiver<bool>>,
) -> (WorkerResult<RunSummary>, Vec<String>) {
    let (tx, rx) = aggregator::channel(64);
    let log = tokio::spawn(LogAggregator::new(rx, Vec::new()).run());

    let logger = WorkerLogger::new("main", tx);
    let mut orchestrator = Orchestrator::new(config, logger.clone());
    if let Some(cancel_rx) = cancel_rx {
        orchestrator = orchestrator.with_cancel(cancel_rx);
    }

    let result = orchestrator.run().await;
    logger.shutdown().await.unwrap();

    let sink = log.await.unwrap().unwrap();
    let lines = String::from_utf8(sink)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    (result, lines)
}

fn youtube_config(server: &MockServer, credentials: &Path) -> YoutubeConfig {
    YoutubeConfig {
        api_base: server.uri(),
        upload_base: server.uri(),
        credentials_path: credentials.to_path_buf(),
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        ..Default::default()
    }
}

async fn mount_search(server: &MockServer, title: &str, total: u64) {
    Mock::given(method("GET"))
        .and(path("/youtube/v3/search"))
        .and(query_param("q", title))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "pageInfo": { "totalResults": total } })),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_converts_new_source() {
    let library = Library::new();
    library.add_source("clip.mkv");
    let config = library.config(FAKE_FFMPEG);

    let (result, log) = run_pipeline(config, None).await;
    let summary = result.unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(std::fs::metadata(library.target("clip.mp4")).unwrap().len(), 2_097_152);

    assert!(log.iter().any(|l| l.contains("Converting clip.mkv: 100%")));
    assert!(log.iter().any(|l| l.contains("INFO [convert-") && l.ends_with("Converted clip.mkv")));
    assert!(log.last().unwrap().contains("Run complete"));
}

#[tokio::test]
async fn test_second_run_skips_converted_target() {
    let library = Library::new();
    library.add_source("clip.mkv");

    let (first, _) = run_pipeline(library.config(FAKE_FFMPEG), None).await;
    assert_eq!(first.unwrap().converted, 1);

    let (second, log) = run_pipeline(library.config(FAKE_FFMPEG), None).await;
    let summary = second.unwrap();
    assert_eq!(summary.converted, 0);
    assert_eq!(summary.already_converted, 1);
    assert!(log.iter().any(|l| l.contains("clip.mkv already converted")));
}

#[tokio::test]
async fn test_small_target_is_reconverted() {
    let library = Library::new();
    library.add_source("clip.mkv");
    let target = library.target("clip.mp4");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(&target, b"truncated").unwrap();

    let (result, log) = run_pipeline(library.config(FAKE_FFMPEG), None).await;
    let summary = result.unwrap();

    assert_eq!(summary.reconverted, 1);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), 2_097_152);
    assert!(log.iter().any(|l| l.contains("WARNING") && l.contains("Reconverting clip.mkv")));
}

#[tokio::test]
async fn test_wrong_container_is_skipped() {
    let library = Library::new();
    library.add_source("notes.txt");
    library.add_source("clip.MP4");

    let (result, _) = run_pipeline(library.config(FAKE_FFMPEG), None).await;
    let summary = result.unwrap();

    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.converted, 1);
    assert!(!library.target("notes.mp4").exists());
}

#[tokio::test]
async fn test_tagged_source_is_uploaded_while_converting() {
    let server = MockServer::start().await;
    mount_search(&server, "Boss fight", 0).await;

    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/videos"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "Location",
            format!("{}/upload/session/1", server.uri()).as_str(),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/session/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "vid-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let library = Library::new();
    library.add_source("Boss fight ytupload.mkv");
    library.write_credentials();
    let mut config = library.config(FAKE_FFMPEG);
    config.youtube = youtube_config(&server, &config.youtube.credentials_path);

    let (result, log) = run_pipeline(config, None).await;
    let summary = result.unwrap();

    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.converted, 1);
    assert!(log
        .iter()
        .any(|l| l.contains("[upload-") && l.contains("Uploaded Boss fight ytupload.mkv as video vid-1")));
}

#[tokio::test]
async fn test_title_already_on_youtube_is_not_uploaded() {
    let server = MockServer::start().await;
    mount_search(&server, "Boss fight", 1).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let library = Library::new();
    library.add_source("Boss fight ytupload.mkv");
    library.write_credentials();
    let mut config = library.config(FAKE_FFMPEG);
    config.youtube = youtube_config(&server, &config.youtube.credentials_path);

    let (result, _) = run_pipeline(config, None).await;
    let summary = result.unwrap();

    assert_eq!(summary.already_on_remote, 1);
    assert_eq!(summary.uploaded, 0);
    assert_eq!(summary.converted, 1);
}

#[tokio::test]
async fn test_missing_credentials_abort_tagged_run() {
    let library = Library::new();
    library.add_source("Boss fight ytupload.mkv");

    let (result, log) = run_pipeline(library.config(FAKE_FFMPEG), None).await;
    let err = result.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.exit_code(), 1);
    assert!(log.iter().any(|l| l.contains("ERROR") && l.contains("Run aborted")));
}

#[tokio::test]
async fn test_missing_ffmpeg_is_fatal() {
    let library = Library::new();
    library.add_source("clip.mkv");
    let mut config = library.config(FAKE_FFMPEG);
    config.encoder.toolchain.ffmpeg = PathBuf::from("/nonexistent/ffmpeg-clipsync");

    let (result, _) = run_pipeline(config, None).await;
    let err = result.unwrap_err();

    assert!(err.is_fatal());
    assert!(!library.target("clip.mp4").exists());
}

#[tokio::test]
async fn test_cancellation_removes_partial_output() {
    let library = Library::new();
    library.add_source("clip.mkv");
    let config = library.config(HANGING_FFMPEG);
    let target = library.target("clip.mp4");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let run = tokio::spawn(run_pipeline(config, Some(cancel_rx)));

    tokio::time::timeout(Duration::from_secs(10), async {
        while !target.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("encoder never started");
    cancel_tx.send(true).unwrap();

    let (result, log) = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("run did not stop after cancellation")
        .unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.exit_code(), 130);
    assert!(!target.exists());
    assert!(log.iter().any(|l| l.contains("Run cancelled")));
}

#[tokio::test]
async fn test_shutdown_message_ends_log_after_all_records() {
    let (tx, rx) = aggregator::channel(4);
    let log = tokio::spawn(LogAggregator::new(rx, Vec::new()).run());

    let main = WorkerLogger::new("main", tx);
    let convert = main.for_worker("convert");
    main.info("start").await.unwrap();
    convert.info("working").await.unwrap();
    main.shutdown().await.unwrap();

    let sink = log.await.unwrap().unwrap();
    let text = String::from_utf8(sink).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(matches!(
        convert.info("too late").await,
        Err(clipsync_worker::WorkerError::LogChannelClosed)
    ));
}
