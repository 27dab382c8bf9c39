//! Selection: per-group inclusion, per-channel caps, global cap and publish
//! ordering.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::channels::{ChannelGroup, ChannelRoster};
use crate::model::ScoredVideo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionLimits {
    pub max_per_channel: usize,
    pub max_total: usize,
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self {
            max_per_channel: 5,
            max_total: 25,
        }
    }
}

/// Counters describing what the selection kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionReport {
    pub input: usize,
    pub unrecognized_dropped: usize,
    pub scored_candidates: usize,
    pub scored_after_channel_cap: usize,
    pub curated_candidates: usize,
    pub curated_matched: usize,
    /// Scored videos removed by the global cap.
    pub scored_truncated: usize,
    /// Curated videos removed by the global cap. Non-zero only on overflow.
    pub curated_truncated: usize,
    /// Curated matches alone exceeded the global cap.
    pub curated_overflow: bool,
}

impl SelectionReport {
    #[must_use]
    pub fn selected(&self) -> usize {
        self.scored_after_channel_cap + self.curated_matched
            - self.scored_truncated
            - self.curated_truncated
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Scored-group picks, highest total first.
    pub scored: Vec<ScoredVideo>,
    /// Curated picks in input order.
    pub curated: Vec<ScoredVideo>,
    pub report: SelectionReport,
}

impl Selection {
    #[must_use]
    pub fn len(&self) -> usize {
        self.scored.len() + self.curated.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scored.is_empty() && self.curated.is_empty()
    }

    /// Scored picks followed by curated picks.
    #[must_use]
    pub fn into_videos(self) -> Vec<ScoredVideo> {
        let mut videos = self.scored;
        videos.extend(self.curated);
        videos
    }
}

/// 採点済み動画からプレイリスト候補を選定する。
///
/// 1. ロスターに無いチャンネルの動画を除外する。
/// 2. scored グループは total 降順の安定ソート後、チャンネルごとに上限件数まで残す。
/// 3. curated グループは判定ルールに一致した動画だけを入力順で残す。
/// 4. 全体上限を超えた場合は scored を末尾から削る。curated だけで上限を
///    超える場合は curated を上限まで切り詰め、scored はすべて落とす。
#[must_use]
pub fn select(
    videos: Vec<ScoredVideo>,
    roster: &ChannelRoster,
    limits: SelectionLimits,
) -> Selection {
    let mut report = SelectionReport {
        input: videos.len(),
        ..SelectionReport::default()
    };

    let mut scored_candidates = Vec::new();
    let mut curated = Vec::new();
    for video in videos {
        match roster.group_of(video.channel_id()) {
            Some(ChannelGroup::Scored) => scored_candidates.push(video),
            Some(ChannelGroup::Curated) => {
                report.curated_candidates += 1;
                if video.curation.is_some() {
                    curated.push(video);
                }
            }
            None => {
                debug!(
                    video_id = video.id(),
                    channel_id = video.channel_id(),
                    "dropping video from unrecognized channel"
                );
                report.unrecognized_dropped += 1;
            }
        }
    }
    report.scored_candidates = scored_candidates.len();
    report.curated_matched = curated.len();

    let mut scored = cap_per_channel(scored_candidates, limits.max_per_channel);
    report.scored_after_channel_cap = scored.len();

    if curated.len() > limits.max_total {
        report.curated_overflow = true;
        report.curated_truncated = curated.len() - limits.max_total;
        report.scored_truncated = scored.len();
        warn!(
            curated = curated.len(),
            max_total = limits.max_total,
            "curated matches exceed the playlist cap; dropping all scored videos"
        );
        curated.truncate(limits.max_total);
        scored.clear();
    } else {
        let room = limits.max_total - curated.len();
        if scored.len() > room {
            report.scored_truncated = scored.len() - room;
            scored.truncate(room);
        }
    }

    Selection {
        scored,
        curated,
        report,
    }
}

fn cap_per_channel(mut videos: Vec<ScoredVideo>, max_per_channel: usize) -> Vec<ScoredVideo> {
    videos.sort_by(|a, b| {
        b.scores
            .total
            .partial_cmp(&a.scores.total)
            .unwrap_or(Ordering::Equal)
    });

    let mut per_channel: HashMap<String, usize> = HashMap::new();
    videos
        .into_iter()
        .filter(|video| {
            let count = per_channel.entry(video.channel_id().to_string()).or_insert(0);
            if *count >= max_per_channel {
                return false;
            }
            *count += 1;
            true
        })
        .collect()
}

/// Newest first; videos without a publish time go last. Stable.
#[must_use]
pub fn publish_order(mut videos: Vec<ScoredVideo>) -> Vec<ScoredVideo> {
    videos.sort_by(|a, b| match (a.video.published_at, b.video.published_at) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    videos
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::channels::{ChannelClass, ChannelEntry};
    use crate::model::{CurationMatch, Scores, VideoMetadata};
    use crate::pipeline::curation::{KeywordRule, SegmentRules};

    fn roster() -> ChannelRoster {
        ChannelRoster::from_entries(vec![
            ChannelEntry::new("s1", None, ChannelClass::Scored),
            ChannelEntry::new("s2", None, ChannelClass::Scored),
            ChannelEntry::new("k1", None, ChannelClass::Keyword(KeywordRule::default())),
            ChannelEntry::new("f1", None, ChannelClass::Segments(SegmentRules::default())),
        ])
        .expect("valid roster")
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap()
    }

    fn video(id: &str, channel: &str, total: f64) -> ScoredVideo {
        ScoredVideo {
            video: VideoMetadata {
                id: id.to_string(),
                channel_id: channel.to_string(),
                ..VideoMetadata::default()
            },
            scores: Scores {
                quality: total,
                viral: total,
                total,
            },
            curation: None,
        }
    }

    fn curated(id: &str, channel: &str, matched: Option<CurationMatch>) -> ScoredVideo {
        ScoredVideo {
            curation: matched,
            ..video(id, channel, 0.5)
        }
    }

    fn ids(videos: &[ScoredVideo]) -> Vec<&str> {
        videos.iter().map(ScoredVideo::id).collect()
    }

    #[test]
    fn empty_input_yields_empty_selection() {
        let selection = select(Vec::new(), &roster(), SelectionLimits::default());
        assert!(selection.is_empty());
        assert_eq!(selection.report, SelectionReport::default());
    }

    #[test]
    fn per_channel_cap_keeps_highest_totals() {
        let videos: Vec<ScoredVideo> = (0..8)
            .map(|i| video(&format!("a{i}"), "s1", f64::from(i) / 10.0))
            .chain((0..2).map(|i| video(&format!("b{i}"), "s2", 0.05)))
            .collect();
        let selection = select(videos, &roster(), SelectionLimits::default());

        assert_eq!(ids(&selection.scored), vec!["a7", "a6", "a5", "a4", "a3", "b0", "b1"]);
        assert_eq!(selection.report.scored_candidates, 10);
        assert_eq!(selection.report.scored_after_channel_cap, 7);
    }

    #[test]
    fn equal_totals_keep_input_order() {
        let videos = vec![
            video("first", "s1", 0.5),
            video("second", "s1", 0.5),
            video("third", "s1", 0.5),
        ];
        let limits = SelectionLimits {
            max_per_channel: 2,
            max_total: 25,
        };
        let selection = select(videos, &roster(), limits);
        assert_eq!(ids(&selection.scored), vec!["first", "second"]);
    }

    #[test]
    fn unrecognized_and_unmatched_videos_are_dropped() {
        let videos = vec![
            video("x", "unknown", 0.99),
            curated("k-miss", "k1", None),
            curated("k-hit", "k1", Some(CurationMatch::Keyword)),
            curated("f-hit", "f1", Some(CurationMatch::LongForm)),
            video("s", "s1", 0.3),
        ];
        let selection = select(videos, &roster(), SelectionLimits::default());

        assert_eq!(ids(&selection.curated), vec!["k-hit", "f-hit"]);
        assert_eq!(ids(&selection.scored), vec!["s"]);
        assert_eq!(selection.report.unrecognized_dropped, 1);
        assert_eq!(selection.report.curated_candidates, 3);
        assert_eq!(selection.report.curated_matched, 2);
        assert_eq!(selection.report.selected(), 3);
    }

    #[test]
    fn global_cap_truncates_scored_from_the_tail() {
        let mut videos: Vec<ScoredVideo> = (0..5)
            .map(|i| video(&format!("a{i}"), "s1", 0.9 - f64::from(i) * 0.1))
            .collect();
        videos.push(curated("k", "k1", Some(CurationMatch::Keyword)));
        videos.push(curated("f", "f1", Some(CurationMatch::FlagshipSegment)));
        let limits = SelectionLimits {
            max_per_channel: 5,
            max_total: 4,
        };
        let selection = select(videos, &roster(), limits);

        assert_eq!(ids(&selection.scored), vec!["a0", "a1"]);
        assert_eq!(ids(&selection.curated), vec!["k", "f"]);
        assert_eq!(selection.report.scored_truncated, 3);
        assert!(!selection.report.curated_overflow);
        assert_eq!(
            ids(&selection.clone().into_videos()),
            vec!["a0", "a1", "k", "f"]
        );
    }

    #[test]
    fn curated_overflow_drops_all_scored() {
        let mut videos = vec![video("s", "s1", 0.9)];
        videos.extend(
            (0..4).map(|i| curated(&format!("k{i}"), "k1", Some(CurationMatch::Keyword))),
        );
        let limits = SelectionLimits {
            max_per_channel: 5,
            max_total: 3,
        };
        let selection = select(videos, &roster(), limits);

        assert!(selection.scored.is_empty());
        assert_eq!(ids(&selection.curated), vec!["k0", "k1", "k2"]);
        assert!(selection.report.curated_overflow);
        assert_eq!(selection.report.curated_truncated, 1);
        assert_eq!(selection.report.scored_truncated, 1);
        assert_eq!(selection.report.selected(), 3);
    }

    #[test]
    fn publish_order_is_newest_first_with_missing_last() {
        let stamp = |id: &str, hours_ago: Option<i64>| ScoredVideo {
            video: VideoMetadata {
                id: id.to_string(),
                published_at: hours_ago.map(|hours| base() - Duration::hours(hours)),
                ..VideoMetadata::default()
            },
            scores: Scores::default(),
            curation: None,
        };
        let ordered = publish_order(vec![
            stamp("none-a", None),
            stamp("old", Some(20)),
            stamp("new", Some(1)),
            stamp("none-b", None),
            stamp("mid", Some(5)),
        ]);
        assert_eq!(ids(&ordered), vec!["new", "mid", "old", "none-a", "none-b"]);
    }
}
