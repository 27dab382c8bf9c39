//! Channel roster: which channels a run reads and how each one is judged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::curation::{KeywordRule, SegmentRules};

/// 選定アルゴリズムの大分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelGroup {
    /// Ranked by the blended numeric score and capped per channel.
    Scored,
    /// Kept only when a channel-specific rule matches.
    Curated,
}

impl ChannelGroup {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelGroup::Scored => "scored",
            ChannelGroup::Curated => "curated",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelClass {
    Scored,
    Segments(SegmentRules),
    Keyword(KeywordRule),
}

impl ChannelClass {
    #[must_use]
    pub fn group(&self) -> ChannelGroup {
        match self {
            ChannelClass::Scored => ChannelGroup::Scored,
            ChannelClass::Segments(_) | ChannelClass::Keyword(_) => ChannelGroup::Curated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawChannelEntry")]
pub struct ChannelEntry {
    pub id: String,
    pub name: Option<String>,
    pub class: ChannelClass,
}

impl ChannelEntry {
    #[must_use]
    pub fn new(id: impl Into<String>, name: Option<&str>, class: ChannelClass) -> Self {
        Self {
            id: id.into(),
            name: name.map(ToString::to_string),
            class,
        }
    }

    fn check_boosts(&self) -> Result<(), RosterError> {
        let boosts: Vec<(&'static str, f64)> = match &self.class {
            ChannelClass::Scored => Vec::new(),
            ChannelClass::Segments(rules) => vec![
                ("flagship_boost", rules.flagship_boost),
                ("long_form_boost", rules.long_form_boost),
            ],
            ChannelClass::Keyword(rule) => vec![("boost", rule.boost)],
        };
        match boosts
            .into_iter()
            .find(|(_, boost)| !boost.is_finite() || *boost < 0.0)
        {
            Some((name, _)) => Err(RosterError::InvalidBoost {
                channel: self.id.clone(),
                name,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawClassKind {
    Scored,
    Segments,
    Keyword,
}

/// YAML shape of a roster entry.
///
/// ```yaml
/// - id: UCcPcua2PF7hzik2TeOBx3uw
///   name: FAZ
///   class: segments
///   segments:
///     long_form_boost: 1.2
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChannelEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    class: RawClassKind,
    #[serde(default)]
    segments: Option<SegmentRules>,
    #[serde(default)]
    keyword: Option<KeywordRule>,
}

impl From<RawChannelEntry> for ChannelEntry {
    fn from(raw: RawChannelEntry) -> Self {
        let class = match raw.class {
            RawClassKind::Scored => ChannelClass::Scored,
            RawClassKind::Segments => ChannelClass::Segments(raw.segments.unwrap_or_default()),
            RawClassKind::Keyword => ChannelClass::Keyword(raw.keyword.unwrap_or_default()),
        };
        Self {
            id: raw.id.trim().to_string(),
            name: raw.name,
            class,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("channel id must not be empty")]
    EmptyId,
    #[error("channel {0} is listed more than once")]
    Duplicate(String),
    #[error("channel {channel} has an invalid {name}: must be a finite, non-negative number")]
    InvalidBoost { channel: String, name: &'static str },
}

/// Ordered channel list with an id index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRoster {
    entries: Vec<ChannelEntry>,
    index: HashMap<String, usize>,
}

impl ChannelRoster {
    /// # Errors
    /// Returns [`RosterError`] for blank or repeated channel ids.
    pub fn from_entries(entries: Vec<ChannelEntry>) -> Result<Self, RosterError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if entry.id.trim().is_empty() {
                return Err(RosterError::EmptyId);
            }
            if index.insert(entry.id.clone(), position).is_some() {
                return Err(RosterError::Duplicate(entry.id.clone()));
            }
            entry.check_boosts()?;
        }
        Ok(Self { entries, index })
    }

    /// Re-checks every entry's boosts.
    ///
    /// # Errors
    /// Returns [`RosterError::InvalidBoost`] for the first negative or
    /// non-finite boost.
    pub fn validate(&self) -> Result<(), RosterError> {
        self.entries.iter().try_for_each(ChannelEntry::check_boosts)
    }

    /// 本番運用で使っているチャンネル構成。
    #[must_use]
    pub fn builtin() -> Self {
        let entries = vec![
            ChannelEntry::new("UCupvZG-5ko_eiXAupbDfxWw", Some("CNN"), ChannelClass::Scored),
            ChannelEntry::new("UCXIJgqnII2ZOINSWNOGFThA", Some("Fox News"), ChannelClass::Scored),
            ChannelEntry::new("UCg40OxZ1GYh3u3jBntB6DLg", Some("Forbes"), ChannelClass::Scored),
            ChannelEntry::new(
                "UCMpW4tdyZUid2Ka9_FuDDhQ",
                Some("Handelsblatt"),
                ChannelClass::Keyword(KeywordRule::default()),
            ),
            ChannelEntry::new(
                "UCcPcua2PF7hzik2TeOBx3uw",
                Some("FAZ"),
                ChannelClass::Segments(SegmentRules::default()),
            ),
        ];
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id.clone(), position))
            .collect();
        Self { entries, index }
    }

    #[must_use]
    pub fn resolve(&self, channel_id: &str) -> Option<&ChannelClass> {
        self.index
            .get(channel_id)
            .map(|&position| &self.entries[position].class)
    }

    #[must_use]
    pub fn group_of(&self, channel_id: &str) -> Option<ChannelGroup> {
        self.resolve(channel_id).map(ChannelClass::group)
    }

    #[must_use]
    pub fn channel_ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }

    #[must_use]
    pub fn entries(&self) -> &[ChannelEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ChannelRoster {
    fn default() -> Self {
        Self::builtin()
    }
}
