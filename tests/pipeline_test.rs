//! パイプライン全体をインメモリのフェイクで動かす統合テスト。

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use news_playlist_curator::{
    channels::{ChannelClass, ChannelEntry, ChannelRoster},
    config::Config,
    model::VideoMetadata,
    observability::Telemetry,
    pipeline::{
        CurationPipeline, PipelineError,
        curation::{KeywordRule, SegmentRules},
        fetch::{FetchRequest, VideoSource},
        publish::{DryRunPublisher, PlaylistPublisher, PublishReport},
        select::SelectionLimits,
    },
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap()
}

struct FakeSource {
    videos: Vec<VideoMetadata>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeSource {
    fn new(videos: Vec<VideoMetadata>) -> Self {
        Self {
            videos,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VideoSource for FakeSource {
    async fn fetch_candidates(&self, request: &FetchRequest) -> Result<Vec<VideoMetadata>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.videos.clone())
    }
}

struct FailingSource;

#[async_trait]
impl VideoSource for FailingSource {
    async fn fetch_candidates(&self, _request: &FetchRequest) -> Result<Vec<VideoMetadata>> {
        bail!("quota exceeded")
    }
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl PlaylistPublisher for RecordingPublisher {
    async fn publish(&self, video_ids: &[String]) -> Result<PublishReport> {
        self.published.lock().unwrap().push(video_ids.to_vec());
        Ok(PublishReport {
            playlist_id: Some("PL-test".to_string()),
            removed: 3,
            inserted: video_ids.len(),
            ..PublishReport::default()
        })
    }
}

struct FailingPublisher;

#[async_trait]
impl PlaylistPublisher for FailingPublisher {
    async fn publish(&self, _video_ids: &[String]) -> Result<PublishReport> {
        bail!("token expired")
    }
}

fn roster() -> ChannelRoster {
    ChannelRoster::from_entries(vec![
        ChannelEntry::new("cnn", Some("CNN"), ChannelClass::Scored),
        ChannelEntry::new("fox", Some("Fox"), ChannelClass::Scored),
        ChannelEntry::new(
            "hb",
            Some("Handelsblatt"),
            ChannelClass::Keyword(KeywordRule::default()),
        ),
        ChannelEntry::new(
            "faz",
            Some("FAZ"),
            ChannelClass::Segments(SegmentRules::default()),
        ),
    ])
    .expect("valid roster")
}

fn scored_video(id: &str, channel: &str, views: u64, hours_ago: i64) -> VideoMetadata {
    VideoMetadata {
        id: id.to_string(),
        channel_id: channel.to_string(),
        title: format!("Economy and markets {id}"),
        description: "Analysis of the policy debate".to_string(),
        published_at: Some(now() - Duration::hours(hours_ago)),
        duration_seconds: 600,
        view_count: views,
        like_count: views / 20,
        comment_count: views / 200,
        tags: vec!["news".to_string()],
        ..VideoMetadata::default()
    }
}

fn fixture() -> Vec<VideoMetadata> {
    let mut videos: Vec<VideoMetadata> = (0..8)
        .map(|i| scored_video(&format!("cnn-{i}"), "cnn", 1_000 * (i + 1), 1 + i as i64))
        .collect();
    videos.push(scored_video("fox-0", "fox", 50_000, 3));
    videos.push(VideoMetadata {
        id: "faz-briefing".to_string(),
        channel_id: "faz".to_string(),
        title: "F.A.Z. Frühdenker • Die Lage am Morgen".to_string(),
        description: "Das Wichtigste zum Start in den Tag".to_string(),
        published_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap()),
        duration_seconds: 540,
        ..VideoMetadata::default()
    });
    videos.push(VideoMetadata {
        id: "faz-clip".to_string(),
        channel_id: "faz".to_string(),
        title: "Kurzer Clip".to_string(),
        published_at: Some(now() - Duration::hours(1)),
        duration_seconds: 90,
        ..VideoMetadata::default()
    });
    videos.push(VideoMetadata {
        id: "hb-koch".to_string(),
        channel_id: "hb".to_string(),
        title: "Wirtschaftsweise im Gespräch".to_string(),
        description: "Mit Ökonom Koch".to_string(),
        published_at: None,
        ..VideoMetadata::default()
    });
    videos.push(scored_video("stray-0", "unknown", 90_000, 1));
    videos
}

fn config(limits: SelectionLimits) -> Arc<Config> {
    Arc::new(
        Config::default()
            .with_roster(roster())
            .with_limits(limits)
            .with_dry_run(true),
    )
}

#[tokio::test]
async fn run_publishes_capped_selection_newest_first() {
    let source = Arc::new(FakeSource::new(fixture()));
    let publisher = Arc::new(RecordingPublisher::default());
    let pipeline = CurationPipeline::new(
        config(SelectionLimits::default()),
        Arc::clone(&source) as Arc<dyn VideoSource>,
        Arc::clone(&publisher) as Arc<dyn PlaylistPublisher>,
    );

    let summary = pipeline.run_at(now()).await.expect("run succeeds");

    let requests = source.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].channel_ids, vec!["cnn", "fox", "hb", "faz"]);
    assert_eq!(requests[0].published_after, now() - Duration::days(1));
    assert_eq!(requests[0].per_channel_cap, 20);

    assert_eq!(summary.fetched, 13);
    assert_eq!(summary.selection.unrecognized_dropped, 1);
    assert_eq!(summary.selection.scored_after_channel_cap, 6);
    assert_eq!(summary.selection.curated_matched, 2);
    assert!(summary.published);
    assert_eq!(summary.publish.inserted, 8);

    let published = publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0], summary.video_ids);

    let ids = &summary.video_ids;
    assert!(ids.contains(&"faz-briefing".to_string()));
    assert!(ids.contains(&"hb-koch".to_string()));
    assert!(!ids.contains(&"faz-clip".to_string()));
    assert!(!ids.contains(&"stray-0".to_string()));
    assert_eq!(ids.iter().filter(|id| id.starts_with("cnn-")).count(), 5);
    assert_eq!(ids.last().map(String::as_str), Some("hb-koch"), "undated video is last");

    let position = |id: &str| ids.iter().position(|candidate| candidate == id);
    assert!(position("faz-briefing") > position("fox-0"));
}

#[tokio::test]
async fn dry_run_is_not_reported_as_published() {
    let telemetry = Telemetry::new().expect("telemetry");
    let pipeline = CurationPipeline::new(
        config(SelectionLimits::default()),
        Arc::new(FakeSource::new(fixture())),
        Arc::new(DryRunPublisher),
    )
    .with_metrics(telemetry.metrics_arc());

    let summary = pipeline.run_at(now()).await.expect("run succeeds");

    assert!(!summary.published);
    assert!(summary.publish.dry_run);
    assert_eq!(summary.publish.inserted, summary.video_ids.len());
    assert_eq!(telemetry.metrics().dry_runs.get(), 1);
    assert_eq!(telemetry.metrics().playlist_items_inserted.get(), 0);
    assert_eq!(telemetry.metrics().runs_completed.get(), 1);
}

#[tokio::test]
async fn run_respects_global_cap_and_keeps_curated() {
    let pipeline = CurationPipeline::new(
        config(SelectionLimits {
            max_per_channel: 5,
            max_total: 4,
        }),
        Arc::new(FakeSource::new(fixture())),
        Arc::new(RecordingPublisher::default()),
    );

    let summary = pipeline.run_at(now()).await.expect("run succeeds");

    assert_eq!(summary.video_ids.len(), 4);
    assert!(summary.video_ids.contains(&"faz-briefing".to_string()));
    assert!(summary.video_ids.contains(&"hb-koch".to_string()));
    assert_eq!(summary.selection.scored_truncated, 4);
    assert!(!summary.selection.curated_overflow);
}

#[tokio::test]
async fn empty_selection_leaves_playlist_untouched() {
    let publisher = Arc::new(RecordingPublisher::default());
    let pipeline = CurationPipeline::new(
        config(SelectionLimits::default()),
        Arc::new(FakeSource::new(vec![scored_video("x", "unknown", 10, 1)])),
        Arc::clone(&publisher) as Arc<dyn PlaylistPublisher>,
    );

    let summary = pipeline.run_at(now()).await.expect("run succeeds");

    assert!(summary.video_ids.is_empty());
    assert!(!summary.published);
    assert!(publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fetch_failure_is_reported_and_counted() {
    let telemetry = Telemetry::new().expect("telemetry");
    let pipeline = CurationPipeline::new(
        config(SelectionLimits::default()),
        Arc::new(FailingSource),
        Arc::new(RecordingPublisher::default()),
    )
    .with_metrics(telemetry.metrics_arc());

    let err = pipeline.run_at(now()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Fetch(_)));
    assert_eq!(telemetry.metrics().runs_failed.get(), 1);
    assert_eq!(telemetry.metrics().runs_completed.get(), 0);
}

#[tokio::test]
async fn publish_failure_is_reported() {
    let pipeline = CurationPipeline::new(
        config(SelectionLimits::default()),
        Arc::new(FakeSource::new(fixture())),
        Arc::new(FailingPublisher),
    );

    let err = pipeline.run_at(now()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Publish(_)));
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("token expired"));
}

#[tokio::test]
async fn snapshot_is_written_when_output_is_configured() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = dir.path().join("latest_news.json");
    let config = Arc::new(
        Config::default()
            .with_roster(roster())
            .with_output(Some(output.clone()))
            .with_dry_run(true),
    );
    let telemetry = Telemetry::new().expect("telemetry");
    let pipeline = CurationPipeline::new(
        config,
        Arc::new(FakeSource::new(fixture())),
        Arc::new(RecordingPublisher::default()),
    )
    .with_metrics(telemetry.metrics_arc());

    let summary = pipeline.run_at(now()).await.expect("run succeeds");

    let written: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&output).expect("snapshot exists"))
            .expect("snapshot is json");
    let ids: Vec<&str> = written
        .iter()
        .filter_map(|video| video["id"].as_str())
        .collect();
    assert_eq!(ids, summary.video_ids);
    assert!(written.iter().all(|video| video["total_score"].is_f64()));

    assert_eq!(telemetry.metrics().videos_fetched.get(), 13);
    assert_eq!(telemetry.metrics().runs_completed.get(), 1);
    assert_eq!(telemetry.metrics().playlist_items_inserted.get(), 8);
}
