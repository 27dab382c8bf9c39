//! Records that flow through a curation run.
//!
//! [`VideoMetadata`] is what a source delivers; [`ScoredVideo`] is the same
//! record annotated by the score calculator. Both are rebuilt every run.

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::util::time::parse_timestamp;

/// 取得元から受け取る動画メタデータ。
///
/// Deserialization never fails on individual malformed fields: counts accept
/// numbers or numeric strings and clamp negatives to 0, timestamps that do not
/// parse become `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub duration_seconds: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub view_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub like_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub comment_count: u64,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Vec<String>,
}

impl VideoMetadata {
    #[must_use]
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds as f64 / 60.0
    }
}

/// Which curated inclusion rule accepted a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationMatch {
    /// Early-morning briefing segment.
    FlagshipSegment,
    /// Podcast, interview or other long-form format.
    LongForm,
    /// Channel-specific keyword found in title or description.
    Keyword,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(rename = "quality_score")]
    pub quality: f64,
    #[serde(rename = "viral_score")]
    pub viral: f64,
    #[serde(rename = "total_score")]
    pub total: f64,
}

/// A video annotated with its scores and, for curated channels, the rule
/// that matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredVideo {
    #[serde(flatten)]
    pub video: VideoMetadata,
    #[serde(flatten)]
    pub scores: Scores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curation: Option<CurationMatch>,
}

impl ScoredVideo {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.video.id
    }

    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.video.channel_id
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

impl RawCount {
    fn into_count(self) -> u64 {
        match self {
            RawCount::Unsigned(value) => value,
            RawCount::Signed(value) => u64::try_from(value).unwrap_or(0),
            RawCount::Float(value) => float_to_count(value),
            RawCount::Text(text) => {
                let trimmed = text.trim();
                trimmed
                    .parse::<i64>()
                    .map(|value| u64::try_from(value).unwrap_or(0))
                    .or_else(|_| trimmed.parse::<f64>().map(float_to_count))
                    .unwrap_or(0)
            }
            RawCount::Other(_) => 0,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn float_to_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.floor() as u64
    } else {
        0
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawCount>::deserialize(deserializer)?.map_or(0, RawCount::into_count))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Text(String),
    Other(IgnoredAny),
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawText>::deserialize(deserializer)? {
        Some(RawText::Text(text)) => text,
        Some(RawText::Other(_)) | None => String::new(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawText>::deserialize(deserializer)? {
        Some(RawText::Text(text)) => parse_timestamp(&text),
        Some(RawText::Other(_)) | None => None,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<RawText>),
    Other(IgnoredAny),
}

fn lenient_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawTags>::deserialize(deserializer)? {
        Some(RawTags::List(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                RawText::Text(text) => Some(text),
                RawText::Other(_) => None,
            })
            .collect(),
        Some(RawTags::Other(_)) | None => Vec::new(),
    })
}
