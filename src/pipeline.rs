use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::model::{ScoredVideo, VideoMetadata};
use crate::observability::metrics::Metrics;

pub mod curation;
pub mod fetch;
pub mod publish;
pub mod score;
pub mod select;

use fetch::{FetchRequest, VideoSource};
use publish::{PlaylistPublisher, PublishReport, write_snapshot};
use score::ScoreCalculator;
use select::{SelectionReport, publish_order, select};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch candidate videos")]
    Fetch(#[source] anyhow::Error),
    #[error("failed to write selection snapshot")]
    Snapshot(#[source] anyhow::Error),
    #[error("failed to publish playlist")]
    Publish(#[source] anyhow::Error),
}

/// Scored, selected and publish-ordered videos of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CuratedPlaylist {
    pub videos: Vec<ScoredVideo>,
    pub report: SelectionReport,
}

impl CuratedPlaylist {
    #[must_use]
    pub fn video_ids(&self) -> Vec<String> {
        self.videos.iter().map(|video| video.id().to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub fetched: usize,
    pub selection: SelectionReport,
    pub video_ids: Vec<String>,
    pub publish: PublishReport,
    /// The playlist was actually rewritten. False for dry runs and empty selections.
    pub published: bool,
}

/// 取得から公開までを同期的に組み合わせた純粋な中核処理。
///
/// 採点 → 選定 → 公開順の並べ替えを行う。I/O は行わない。
#[must_use]
pub fn curate(videos: Vec<VideoMetadata>, config: &Config, now: DateTime<Utc>) -> CuratedPlaylist {
    let calculator = ScoreCalculator::new(config.quality_keywords(), now);
    let scored = calculator.score_all(videos, config.roster());
    let selection = select(scored, config.roster(), config.limits());
    let report = selection.report;
    CuratedPlaylist {
        videos: publish_order(selection.into_videos()),
        report,
    }
}

/// One curation run: fetch → score → select → order → snapshot → publish.
pub struct CurationPipeline {
    config: Arc<Config>,
    source: Arc<dyn VideoSource>,
    publisher: Arc<dyn PlaylistPublisher>,
    metrics: Option<Arc<Metrics>>,
}

impl CurationPipeline {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn VideoSource>,
        publisher: Arc<dyn PlaylistPublisher>,
    ) -> Self {
        Self {
            config,
            source,
            publisher,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    /// Returns [`PipelineError`] when fetching, writing the snapshot or
    /// publishing fails.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        self.run_at(Utc::now()).await
    }

    /// Runs with an explicit reference time for recency and the lookback
    /// cutoff.
    ///
    /// # Errors
    /// See [`CurationPipeline::run`].
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("curation_run", run_id = %run_id);
        let started = Instant::now();

        let result = self.execute(run_id, now).instrument(span).await;

        if let Some(metrics) = &self.metrics {
            metrics.run_duration.observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(_) => metrics.runs_completed.inc(),
                Err(_) => metrics.runs_failed.inc(),
            }
        }
        result
    }

    async fn execute(&self, run_id: Uuid, now: DateTime<Utc>) -> Result<RunSummary, PipelineError> {
        let request = FetchRequest {
            channel_ids: self.config.roster().channel_ids(),
            published_after: now - Duration::days(i64::from(self.config.lookback_days())),
            per_channel_cap: self.config.max_fetch_per_channel(),
        };
        info!(
            channels = request.channel_ids.len(),
            published_after = %request.published_after,
            per_channel_cap = request.per_channel_cap,
            "fetching candidate videos"
        );

        let fetch_timer = self
            .metrics
            .as_ref()
            .map(|metrics| metrics.fetch_duration.start_timer());
        let videos = self
            .source
            .fetch_candidates(&request)
            .await
            .map_err(PipelineError::Fetch)?;
        drop(fetch_timer);
        let fetched = videos.len();

        let playlist = curate(videos, &self.config, now);
        let report = playlist.report;
        info!(
            fetched,
            selected = playlist.videos.len(),
            unrecognized = report.unrecognized_dropped,
            scored_kept = report.scored_after_channel_cap,
            curated_matched = report.curated_matched,
            scored_truncated = report.scored_truncated,
            curated_overflow = report.curated_overflow,
            "selection complete"
        );
        if let Some(metrics) = &self.metrics {
            metrics.videos_fetched.inc_by(fetched as u64);
            metrics.videos_scored.inc_by(fetched as u64);
            metrics.record_selection(&report);
        }

        if let Some(path) = self.config.output() {
            write_snapshot(path, &playlist.videos)
                .await
                .map_err(PipelineError::Snapshot)?;
        }

        let video_ids = playlist.video_ids();
        let (publish, published) = if video_ids.is_empty() {
            warn!("no videos selected; leaving the playlist unchanged");
            (PublishReport::default(), false)
        } else {
            let publish = self
                .publisher
                .publish(&video_ids)
                .await
                .map_err(PipelineError::Publish)?;
            if let Some(metrics) = &self.metrics {
                metrics.record_publish(&publish);
            }
            if publish.dry_run {
                info!(would_insert = publish.inserted, "dry run: playlist left unchanged");
            }
            let published = !publish.dry_run;
            (publish, published)
        };

        Ok(RunSummary {
            run_id,
            fetched,
            selection: report,
            video_ids,
            publish,
            published,
        })
    }
}
