//! Inclusion rules for curated channels.
//!
//! Curated channels are not ranked numerically. A video is kept when one of
//! its channel's boolean rules accepts it, and the matching rule also decides
//! the quality boost applied by the score calculator.
//!
//! - [`SegmentRules`]: a flagship briefing rule (publish hour, bullet title,
//!   fixed length, fixed description opening) and a long-form rule
//!   (podcast titles, interview-style titles on longer videos).
//! - [`KeywordRule`]: one term in title or description.

use chrono::{FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CurationMatch, VideoMetadata};
use crate::util::text::{contains_ignore_case, lowercase_prefix};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagshipRule {
    /// First accepted publish hour, inclusive.
    pub start_hour: u32,
    /// Last accepted publish hour, inclusive.
    pub end_hour: u32,
    /// Offset applied to the UTC publish time before reading the hour.
    pub utc_offset_hours: i32,
    pub title_markers: Vec<String>,
    pub min_minutes: f64,
    pub max_minutes: f64,
    pub description_prefixes: Vec<String>,
    pub prefix_window_chars: usize,
}

impl Default for FlagshipRule {
    fn default() -> Self {
        Self {
            start_hour: 5,
            end_hour: 7,
            utc_offset_hours: 0,
            title_markers: vec!["•".to_string()],
            min_minutes: 8.0,
            max_minutes: 12.0,
            description_prefixes: vec!["das wichtigste".to_string(), "die nachrichten".to_string()],
            prefix_window_chars: 30,
        }
    }
}

impl FlagshipRule {
    /// All conditions must hold. A video without a publish time never matches.
    #[must_use]
    pub fn matches(&self, video: &VideoMetadata) -> bool {
        let Some(published_at) = video.published_at else {
            return false;
        };
        let offset = FixedOffset::east_opt(self.utc_offset_hours.saturating_mul(3_600))
            .unwrap_or_else(|| Utc.fix());
        let hour = published_at.with_timezone(&offset).hour();
        if !(self.start_hour..=self.end_hour).contains(&hour) {
            return false;
        }

        if !self
            .title_markers
            .iter()
            .any(|marker| video.title.contains(marker.as_str()))
        {
            return false;
        }

        let minutes = video.duration_minutes();
        if minutes < self.min_minutes || minutes > self.max_minutes {
            return false;
        }

        let opening = lowercase_prefix(&video.description, self.prefix_window_chars);
        self.description_prefixes
            .iter()
            .any(|prefix| opening.starts_with(&prefix.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongFormRule {
    /// Any of these in the title accepts the video regardless of length.
    pub title_keywords: Vec<String>,
    pub interview_min_minutes: f64,
    pub interview_markers: Vec<String>,
    pub feature_min_minutes: f64,
    pub feature_markers: Vec<String>,
}

impl Default for LongFormRule {
    fn default() -> Self {
        Self {
            title_keywords: [
                "podcast für deutschland",
                "f.a.z. digitalwirtschaft",
                "f.a.z. einspruch",
                "f.a.z. gesundheit",
                "f.a.z. finanzen & immobilien",
            ]
            .into_iter()
            .map(ToString::to_string)
            .collect(),
            interview_min_minutes: 10.0,
            interview_markers: vec![":".to_string(), "?".to_string()],
            feature_min_minutes: 20.0,
            feature_markers: [" - ", "\"", "\u{201c}", "\u{201d}", "\u{201e}"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl LongFormRule {
    #[must_use]
    pub fn matches(&self, video: &VideoMetadata) -> bool {
        if self
            .title_keywords
            .iter()
            .any(|keyword| contains_ignore_case(&video.title, keyword))
        {
            return true;
        }

        let minutes = video.duration_minutes();
        let has_marker = |markers: &[String]| {
            markers
                .iter()
                .any(|marker| video.title.contains(marker.as_str()))
        };

        (minutes >= self.interview_min_minutes && has_marker(&self.interview_markers))
            || (minutes >= self.feature_min_minutes && has_marker(&self.feature_markers))
    }
}

/// Rules for a channel whose selection is driven by recurring formats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentRules {
    pub flagship: FlagshipRule,
    pub long_form: LongFormRule,
    pub flagship_boost: f64,
    pub long_form_boost: f64,
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self {
            flagship: FlagshipRule::default(),
            long_form: LongFormRule::default(),
            flagship_boost: 1.5,
            long_form_boost: 1.3,
        }
    }
}

impl SegmentRules {
    /// The flagship rule takes precedence when both accept the video.
    #[must_use]
    pub fn evaluate(&self, video: &VideoMetadata) -> Option<CurationMatch> {
        if self.flagship.matches(video) {
            Some(CurationMatch::FlagshipSegment)
        } else if self.long_form.matches(video) {
            Some(CurationMatch::LongForm)
        } else {
            None
        }
    }

    #[must_use]
    pub fn boost_for(&self, matched: CurationMatch) -> f64 {
        match matched {
            CurationMatch::FlagshipSegment => self.flagship_boost,
            CurationMatch::LongForm => self.long_form_boost,
            CurationMatch::Keyword => 1.0,
        }
    }
}

/// Rule for a channel where one recurring name or topic decides inclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordRule {
    pub term: String,
    pub boost: f64,
}

impl Default for KeywordRule {
    fn default() -> Self {
        Self {
            term: "koch".to_string(),
            boost: 1.5,
        }
    }
}

impl KeywordRule {
    #[must_use]
    pub fn evaluate(&self, video: &VideoMetadata) -> Option<CurationMatch> {
        let term = self.term.trim();
        if term.is_empty() {
            return None;
        }
        (contains_ignore_case(&video.title, term) || contains_ignore_case(&video.description, term))
            .then_some(CurationMatch::Keyword)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone};
    use rstest::rstest;

    use super::*;

    fn at_hour(hour: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 5, 2, hour, 15, 0).unwrap())
    }

    fn briefing() -> VideoMetadata {
        VideoMetadata {
            id: "faz-1".to_string(),
            channel_id: "faz".to_string(),
            title: "Top News • Markets Today".to_string(),
            description: "Das Wichtigste in Kürze: Zinsen, Wahlen, Wetter".to_string(),
            published_at: at_hour(6),
            duration_seconds: 600,
            ..VideoMetadata::default()
        }
    }

    #[test]
    fn flagship_accepts_morning_briefing() {
        assert!(FlagshipRule::default().matches(&briefing()));
    }

    #[test]
    fn flagship_accepts_second_opening_phrase() {
        let video = VideoMetadata {
            description: "DIE NACHRICHTEN vom Morgen".to_string(),
            ..briefing()
        };
        assert!(FlagshipRule::default().matches(&video));
    }

    #[rstest]
    #[case::too_early(at_hour(4), "Top • News", 600, "Das Wichtigste")]
    #[case::too_late(at_hour(8), "Top • News", 600, "Das Wichtigste")]
    #[case::missing_timestamp(None, "Top • News", 600, "Das Wichtigste")]
    #[case::no_bullet(at_hour(6), "Top News", 600, "Das Wichtigste")]
    #[case::too_short(at_hour(6), "Top • News", 420, "Das Wichtigste")]
    #[case::too_long(at_hour(6), "Top • News", 780, "Das Wichtigste")]
    #[case::wrong_opening(at_hour(6), "Top • News", 600, "Heute: Das Wichtigste")]
    fn flagship_requires_every_condition(
        #[case] published_at: Option<DateTime<Utc>>,
        #[case] title: &str,
        #[case] duration_seconds: u64,
        #[case] description: &str,
    ) {
        let video = VideoMetadata {
            title: title.to_string(),
            description: description.to_string(),
            published_at,
            duration_seconds,
            ..briefing()
        };
        assert!(!FlagshipRule::default().matches(&video));
    }

    #[test]
    fn flagship_hour_respects_offset() {
        let rule = FlagshipRule {
            utc_offset_hours: 2,
            ..FlagshipRule::default()
        };
        let video = VideoMetadata {
            published_at: at_hour(4),
            ..briefing()
        };
        assert!(rule.matches(&video));
        assert!(!FlagshipRule::default().matches(&video));
    }

    #[test]
    fn flagship_duration_bounds_are_inclusive() {
        for seconds in [480, 720] {
            let video = VideoMetadata {
                duration_seconds: seconds,
                ..briefing()
            };
            assert!(FlagshipRule::default().matches(&video), "{seconds}s");
        }
    }

    #[rstest]
    #[case::podcast_keyword("Podcast für Deutschland: Folge 12", 300, true)]
    #[case::interview_long_enough("Wohin steuert die EZB?", 600, true)]
    #[case::interview_too_short("Wohin steuert die EZB?", 540, false)]
    #[case::colon_title("Analyse: Haushaltsstreit", 900, true)]
    #[case::dash_feature("Merz - Die ganze Rede", 1_200, true)]
    #[case::dash_too_short("Merz - Die ganze Rede", 1_140, false)]
    #[case::quoted_feature("„Wir schaffen das“ revisited", 1_500, true)]
    #[case::plain_quote_feature("\"Zeitenwende\" erklärt", 1_500, true)]
    #[case::plain_title("Nachrichten am Abend", 3_600, false)]
    fn long_form_cases(#[case] title: &str, #[case] duration_seconds: u64, #[case] expected: bool) {
        let video = VideoMetadata {
            title: title.to_string(),
            duration_seconds,
            ..VideoMetadata::default()
        };
        assert_eq!(LongFormRule::default().matches(&video), expected);
    }

    #[test]
    fn segment_rules_prefer_flagship_match() {
        let rules = SegmentRules::default();
        let video = VideoMetadata {
            title: "Frühdenker • Was ist los?".to_string(),
            duration_seconds: 660,
            ..briefing()
        };
        assert!(rules.long_form.matches(&video));
        assert_eq!(rules.evaluate(&video), Some(CurationMatch::FlagshipSegment));
        assert!((rules.boost_for(CurationMatch::FlagshipSegment) - 1.5).abs() < f64::EPSILON);
        assert!((rules.boost_for(CurationMatch::LongForm) - 1.3).abs() < f64::EPSILON);
    }

    #[test]
    fn keyword_rule_checks_title_and_description() {
        let rule = KeywordRule::default();
        let in_title = VideoMetadata {
            title: "Koch erklärt die Märkte".to_string(),
            ..VideoMetadata::default()
        };
        let in_description = VideoMetadata {
            description: "Mit Finanzexperte Dr. KOCH".to_string(),
            ..VideoMetadata::default()
        };
        let absent = VideoMetadata {
            title: "Börse am Mittag".to_string(),
            ..VideoMetadata::default()
        };

        assert_eq!(rule.evaluate(&in_title), Some(CurationMatch::Keyword));
        assert_eq!(rule.evaluate(&in_description), Some(CurationMatch::Keyword));
        assert_eq!(rule.evaluate(&absent), None);
    }

    #[test]
    fn blank_keyword_never_matches() {
        let rule = KeywordRule {
            term: "  ".to_string(),
            boost: 1.5,
        };
        let video = VideoMetadata {
            title: "anything".to_string(),
            ..VideoMetadata::default()
        };
        assert_eq!(rule.evaluate(&video), None);
    }
}
