use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::model::ScoredVideo;

/// Snapshot of the target playlist as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub privacy_status: Option<String>,
    pub item_count: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl PlaylistInfo {
    #[must_use]
    pub fn url_for(playlist_id: &str) -> String {
        format!("https://www.youtube.com/playlist?list={playlist_id}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub playlist_id: Option<String>,
    /// The playlist did not exist and was created by this run.
    pub created: bool,
    /// Items removed from the playlist before inserting.
    pub removed: usize,
    pub inserted: usize,
    /// Nothing was written; `inserted` counts the items that would have been.
    pub dry_run: bool,
    /// Playlist state read back after publishing, when available.
    pub playlist: Option<PlaylistInfo>,
}

/// 選定済み動画IDでプレイリストを置き換える。
///
/// Implementations clear the target playlist and then insert `video_ids` in
/// order, so the final playlist position of each id equals its index.
#[async_trait]
pub trait PlaylistPublisher: Send + Sync {
    async fn publish(&self, video_ids: &[String]) -> Result<PublishReport>;
}

/// Logs the playlist instead of publishing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPublisher;

#[async_trait]
impl PlaylistPublisher for DryRunPublisher {
    async fn publish(&self, video_ids: &[String]) -> Result<PublishReport> {
        for (position, video_id) in video_ids.iter().enumerate() {
            info!(position, video_id = %video_id, "dry run: would insert playlist item");
        }
        Ok(PublishReport {
            inserted: video_ids.len(),
            dry_run: true,
            ..PublishReport::default()
        })
    }
}

/// Writes `videos` as a pretty-printed JSON array, creating parent
/// directories as needed.
pub async fn write_snapshot(path: &Path, videos: &[ScoredVideo]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(videos).context("failed to serialize snapshot")?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write snapshot {}", path.display()))?;
    info!(path = %path.display(), videos = videos.len(), "snapshot written");
    Ok(())
}
