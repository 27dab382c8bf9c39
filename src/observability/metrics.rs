//! Prometheusメトリクス定義。
use prometheus::{
    Histogram, IntCounter, IntCounterVec, Registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
};
use std::sync::Arc;

use crate::channels::ChannelGroup;
use crate::pipeline::publish::PublishReport;
use crate::pipeline::select::SelectionReport;

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub videos_fetched: IntCounter,
    pub videos_scored: IntCounter,
    pub videos_unrecognized: IntCounter,
    pub videos_selected: IntCounterVec,
    pub videos_truncated: IntCounterVec,
    pub curated_overflow: IntCounter,
    pub playlist_items_removed: IntCounter,
    pub playlist_items_inserted: IntCounter,
    pub playlists_created: IntCounter,
    pub dry_runs: IntCounter,
    pub runs_completed: IntCounter,
    pub runs_failed: IntCounter,

    // ヒストグラム
    pub fetch_duration: Histogram,
    pub run_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            videos_fetched: register_int_counter_with_registry!(
                "curator_videos_fetched_total",
                "Total number of candidate videos fetched",
                registry
            )?,
            videos_scored: register_int_counter_with_registry!(
                "curator_videos_scored_total",
                "Total number of videos scored",
                registry
            )?,
            videos_unrecognized: register_int_counter_with_registry!(
                "curator_videos_unrecognized_total",
                "Videos dropped because their channel is not in the roster",
                registry
            )?,
            videos_selected: register_int_counter_vec_with_registry!(
                "curator_videos_selected_total",
                "Videos selected for the playlist by channel group",
                &["group"],
                registry
            )?,
            videos_truncated: register_int_counter_vec_with_registry!(
                "curator_videos_truncated_total",
                "Videos removed by the playlist size cap by channel group",
                &["group"],
                registry
            )?,
            curated_overflow: register_int_counter_with_registry!(
                "curator_curated_overflow_total",
                "Runs where curated matches alone exceeded the playlist cap",
                registry
            )?,
            playlist_items_removed: register_int_counter_with_registry!(
                "curator_playlist_items_removed_total",
                "Playlist items deleted before republishing",
                registry
            )?,
            playlist_items_inserted: register_int_counter_with_registry!(
                "curator_playlist_items_inserted_total",
                "Playlist items inserted",
                registry
            )?,
            playlists_created: register_int_counter_with_registry!(
                "curator_playlists_created_total",
                "Target playlists created because none existed",
                registry
            )?,
            dry_runs: register_int_counter_with_registry!(
                "curator_dry_runs_total",
                "Runs that logged the playlist instead of publishing it",
                registry
            )?,
            runs_completed: register_int_counter_with_registry!(
                "curator_runs_completed_total",
                "Total number of runs completed",
                registry
            )?,
            runs_failed: register_int_counter_with_registry!(
                "curator_runs_failed_total",
                "Total number of runs failed",
                registry
            )?,
            fetch_duration: register_histogram_with_registry!(
                "curator_fetch_duration_seconds",
                "Time spent fetching candidate videos",
                vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                "curator_run_duration_seconds",
                "Duration of a full curation run",
                vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0],
                registry
            )?,
        })
    }

    /// 選定結果をカウンターへ反映する。
    pub fn record_selection(&self, report: &SelectionReport) {
        self.videos_unrecognized
            .inc_by(report.unrecognized_dropped as u64);

        let scored_selected = report.scored_after_channel_cap - report.scored_truncated;
        let curated_selected = report.curated_matched - report.curated_truncated;
        self.videos_selected
            .with_label_values(&[ChannelGroup::Scored.as_str()])
            .inc_by(scored_selected as u64);
        self.videos_selected
            .with_label_values(&[ChannelGroup::Curated.as_str()])
            .inc_by(curated_selected as u64);
        self.videos_truncated
            .with_label_values(&[ChannelGroup::Scored.as_str()])
            .inc_by(report.scored_truncated as u64);
        self.videos_truncated
            .with_label_values(&[ChannelGroup::Curated.as_str()])
            .inc_by(report.curated_truncated as u64);

        if report.curated_overflow {
            self.curated_overflow.inc();
        }
    }

    /// 公開結果をカウンターへ反映する。ドライランは挿入数に含めない。
    pub fn record_publish(&self, report: &PublishReport) {
        if report.dry_run {
            self.dry_runs.inc();
            return;
        }
        self.playlist_items_removed.inc_by(report.removed as u64);
        self.playlist_items_inserted.inc_by(report.inserted as u64);
        if report.created {
            self.playlists_created.inc();
        }
    }
}
