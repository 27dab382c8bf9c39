//! Quality and viral scoring.
//!
//! Every component is normalized to `[0, 1]` before weighting, so both
//! scores stay inside `[0, 1]`. Scoring reads a fixed reference time instead
//! of the wall clock and is therefore a pure function of its inputs.

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::channels::{ChannelClass, ChannelRoster};
use crate::model::{CurationMatch, Scores, ScoredVideo, VideoMetadata};
use crate::util::text::{char_len, normalize_term};
use crate::util::time::hours_between;

const ENGAGEMENT_WEIGHT: f64 = 0.25;
const COMMENT_WEIGHT: f64 = 0.15;
const LENGTH_WEIGHT: f64 = 0.20;
const DEPTH_WEIGHT: f64 = 0.15;
const RECENCY_WEIGHT: f64 = 0.10;
const THEMATIC_WEIGHT: f64 = 0.15;

const VIEWS_PER_HOUR_WEIGHT: f64 = 0.60;
const LIKE_RATIO_WEIGHT: f64 = 0.25;
const COMMENT_RATIO_WEIGHT: f64 = 0.15;

const SCORED_QUALITY_SHARE: f64 = 0.7;
const SCORED_VIRAL_SHARE: f64 = 0.3;

/// Age assumed for videos without a publish time.
const UNKNOWN_AGE_HOURS: f64 = 24.0;

#[derive(Debug, Clone)]
pub struct ScoreCalculator {
    keywords: Vec<String>,
    reference_time: DateTime<Utc>,
}

impl ScoreCalculator {
    /// Keywords are trimmed and lowercased; blank entries are dropped.
    #[must_use]
    pub fn new<I, S>(keywords: I, reference_time: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .filter_map(|keyword| normalize_term(keyword.as_ref()))
            .collect();
        Self {
            keywords,
            reference_time,
        }
    }

    #[must_use]
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    #[must_use]
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    /// Scores for `video` under `class`. `None` (unknown channel) is scored
    /// like a scored-group channel.
    #[must_use]
    pub fn calculate(&self, video: &VideoMetadata, class: Option<&ChannelClass>) -> Scores {
        self.scores_for(video, class, curation_match(video, class))
    }

    /// Scores `video` and records which curated rule, if any, accepted it.
    #[must_use]
    pub fn annotate(&self, video: VideoMetadata, class: Option<&ChannelClass>) -> ScoredVideo {
        let curation = curation_match(&video, class);
        let scores = self.scores_for(&video, class, curation);
        ScoredVideo {
            video,
            scores,
            curation,
        }
    }

    /// Annotates every video in parallel. Output order matches input order.
    #[must_use]
    pub fn score_all(&self, videos: Vec<VideoMetadata>, roster: &ChannelRoster) -> Vec<ScoredVideo> {
        videos
            .into_par_iter()
            .map(|video| {
                let class = roster.resolve(&video.channel_id);
                self.annotate(video, class)
            })
            .collect()
    }

    fn scores_for(
        &self,
        video: &VideoMetadata,
        class: Option<&ChannelClass>,
        curation: Option<CurationMatch>,
    ) -> Scores {
        let hours = self.hours_since_published(video);
        let quality = self.quality_score(video, hours);
        let viral = viral_score(video, hours);

        let total = match (class, curation) {
            (Some(ChannelClass::Segments(rules)), matched) => {
                let boost = matched.map_or(1.0, |matched| rules.boost_for(matched));
                boosted_total(quality, boost)
            }
            (Some(ChannelClass::Keyword(rule)), matched) => {
                let boost = if matched.is_some() { rule.boost } else { 1.0 };
                boosted_total(quality, boost)
            }
            (Some(ChannelClass::Scored) | None, _) => {
                SCORED_QUALITY_SHARE * quality + SCORED_VIRAL_SHARE * viral
            }
        };

        Scores {
            quality,
            viral,
            total,
        }
    }

    fn hours_since_published(&self, video: &VideoMetadata) -> f64 {
        video
            .published_at
            .map_or(UNKNOWN_AGE_HOURS, |published_at| {
                hours_between(published_at, self.reference_time)
            })
    }

    fn quality_score(&self, video: &VideoMetadata, hours: f64) -> f64 {
        ENGAGEMENT_WEIGHT * engagement_component(video)
            + COMMENT_WEIGHT * comment_component(video)
            + LENGTH_WEIGHT * length_component(video)
            + DEPTH_WEIGHT * depth_component(video)
            + RECENCY_WEIGHT * recency_component(hours)
            + THEMATIC_WEIGHT * self.thematic_component(video)
    }

    fn thematic_component(&self, video: &VideoMetadata) -> f64 {
        if self.keywords.is_empty() {
            return 0.5;
        }
        let text = format!("{} {}", video.title, video.description).to_lowercase();
        let matches = self
            .keywords
            .iter()
            .filter(|keyword| text.contains(keyword.as_str()))
            .count();
        let expected = (0.2 * self.keywords.len() as f64).max(1.0);
        (matches as f64 / expected).min(1.0)
    }
}

fn curation_match(video: &VideoMetadata, class: Option<&ChannelClass>) -> Option<CurationMatch> {
    match class? {
        ChannelClass::Scored => None,
        ChannelClass::Segments(rules) => rules.evaluate(video),
        ChannelClass::Keyword(rule) => rule.evaluate(video),
    }
}

/// Boosted quality kept inside `[0, 1]`; a NaN product scores 0.
fn boosted_total(quality: f64, boost: f64) -> f64 {
    let boosted = quality * boost;
    if boosted.is_nan() {
        0.0
    } else {
        boosted.clamp(0.0, 1.0)
    }
}

/// `numerator / views`, or 0 when there are no views.
fn per_view(numerator: u64, views: u64) -> f64 {
    if views == 0 {
        0.0
    } else {
        numerator as f64 / views as f64
    }
}

fn engagement_component(video: &VideoMetadata) -> f64 {
    let per_ten_thousand = per_view(video.like_count, video.view_count) * 10_000.0;
    (per_ten_thousand / 300.0).min(1.0)
}

fn comment_component(video: &VideoMetadata) -> f64 {
    let per_ten_thousand = per_view(video.comment_count, video.view_count) * 10_000.0;
    (per_ten_thousand / 50.0).min(1.0)
}

fn length_component(video: &VideoMetadata) -> f64 {
    let minutes = video.duration_minutes();
    if (7.0..=20.0).contains(&minutes) {
        1.0
    } else if (3.0..7.0).contains(&minutes) {
        0.7
    } else if minutes > 20.0 {
        0.8
    } else {
        0.2
    }
}

fn depth_component(video: &VideoMetadata) -> f64 {
    let tags = (video.tags.len() as f64 / 10.0).min(1.0);
    let description = (char_len(&video.description) as f64 / 1000.0).min(1.0);
    0.4 * tags + 0.6 * description
}

fn recency_component(hours: f64) -> f64 {
    (1.0 - hours / 24.0).max(0.0)
}

fn viral_score(video: &VideoMetadata, hours: f64) -> f64 {
    let views_per_hour = video.view_count as f64 / hours.max(1.0);
    let velocity = (views_per_hour / 1000.0).min(1.0);
    let like_ratio = (per_view(video.like_count, video.view_count) * 100.0 / 5.0).min(1.0);
    let comment_ratio = (per_view(video.comment_count, video.view_count) * 100.0).min(1.0);

    VIEWS_PER_HOUR_WEIGHT * velocity
        + LIKE_RATIO_WEIGHT * like_ratio
        + COMMENT_RATIO_WEIGHT * comment_ratio
}
