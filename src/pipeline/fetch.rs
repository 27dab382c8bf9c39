use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::model::VideoMetadata;

/// What a run asks its source for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub channel_ids: Vec<String>,
    /// Uploads published before this instant are skipped.
    pub published_after: DateTime<Utc>,
    pub per_channel_cap: usize,
}

/// 候補動画の取得元。
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn fetch_candidates(&self, request: &FetchRequest) -> Result<Vec<VideoMetadata>>;
}

/// Reads candidates from a JSON array written by an earlier run.
///
/// Score fields present in the file are ignored. The request filters are
/// applied as the API source would: only requested channels, only uploads
/// after the cutoff, at most `per_channel_cap` per channel in file order.
/// Videos without a publish time are kept.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl VideoSource for JsonFileSource {
    async fn fetch_candidates(&self, request: &FetchRequest) -> Result<Vec<VideoMetadata>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read video snapshot {}", self.path.display()))?;
        let videos: Vec<VideoMetadata> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse video snapshot {}", self.path.display()))?;
        let total = videos.len();

        let mut per_channel: HashMap<String, usize> = HashMap::new();
        let mut selected = Vec::new();
        for video in videos {
            if !request.channel_ids.contains(&video.channel_id) {
                continue;
            }
            if video
                .published_at
                .is_some_and(|published_at| published_at < request.published_after)
            {
                continue;
            }
            let count = per_channel.entry(video.channel_id.clone()).or_insert(0);
            if *count >= request.per_channel_cap {
                debug!(video_id = %video.id, "per-channel fetch cap reached");
                continue;
            }
            *count += 1;
            selected.push(video);
        }

        info!(
            path = %self.path.display(),
            total,
            selected = selected.len(),
            "loaded candidates from snapshot"
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use std::io::Write;
    use tempfile::NamedTempFile;

    use super::*;

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn write_snapshot(videos: &serde_json::Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "{videos}").expect("write snapshot");
        file
    }

    #[tokio::test]
    async fn filters_by_channel_cutoff_and_cap() {
        let recent = (cutoff() + Duration::hours(2)).to_rfc3339();
        let stale = (cutoff() - Duration::hours(2)).to_rfc3339();
        let file = write_snapshot(&serde_json::json!([
            {"id": "a1", "channel_id": "a", "published_at": recent, "total_score": 0.4},
            {"id": "a2", "channel_id": "a", "published_at": stale},
            {"id": "a3", "channel_id": "a"},
            {"id": "a4", "channel_id": "a", "published_at": recent},
            {"id": "b1", "channel_id": "b", "published_at": recent},
            {"id": "c1", "channel_id": "c", "published_at": recent}
        ]));

        let source = JsonFileSource::new(file.path());
        let request = FetchRequest {
            channel_ids: vec!["a".to_string(), "b".to_string()],
            published_after: cutoff(),
            per_channel_cap: 2,
        };
        let videos = source.fetch_candidates(&request).await.expect("snapshot loads");
        let ids: Vec<&str> = videos.iter().map(|video| video.id.as_str()).collect();

        assert_eq!(ids, vec!["a1", "a3", "b1"]);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = JsonFileSource::new("/nonexistent/videos.json");
        let request = FetchRequest {
            channel_ids: vec!["a".to_string()],
            published_after: cutoff(),
            per_channel_cap: 5,
        };
        let err = source.fetch_candidates(&request).await.unwrap_err();
        assert!(err.to_string().contains("failed to read video snapshot"));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "{{not json").expect("write");
        let source = JsonFileSource::new(file.path());
        let request = FetchRequest {
            channel_ids: vec!["a".to_string()],
            published_after: cutoff(),
            per_channel_cap: 5,
        };
        let err = source.fetch_candidates(&request).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse video snapshot"));
    }
}
