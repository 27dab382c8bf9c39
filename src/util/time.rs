use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

static ISO8601_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(?P<weeks>\d+)W)?(?:(?P<days>\d+)D)?(?:T(?:(?P<hours>\d+)H)?(?:(?P<minutes>\d+)M)?(?:(?P<seconds>\d+)(?:\.\d+)?S)?)?$",
    )
    .expect("ISO 8601 duration pattern is valid")
});

/// Parses a timestamp as published by the platform API.
///
/// Accepts RFC 3339 (`2024-05-01T06:10:00Z`, `...+02:00`) and offset-less
/// ISO 8601 values, which are read as UTC. Anything else yields `None`.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
}

/// Elapsed hours between `earlier` and `later`, never negative.
#[must_use]
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let seconds = (later - earlier).num_milliseconds() as f64 / 1000.0;
    (seconds / 3600.0).max(0.0)
}

/// ISO 8601 の再生時間（`PT1H2M3S` など）を秒数に変換する。
///
/// 解釈できない値や u64 に収まらない値は 0 秒として扱う。
#[must_use]
pub fn parse_iso8601_duration(raw: &str) -> u64 {
    let Some(captures) = ISO8601_DURATION.captures(raw.trim()) else {
        return 0;
    };
    let units: [(&str, u64); 5] = [
        ("weeks", 7 * 86_400),
        ("days", 86_400),
        ("hours", 3_600),
        ("minutes", 60),
        ("seconds", 1),
    ];
    units
        .iter()
        .try_fold(0u64, |total, &(name, unit_seconds)| {
            let Some(value) = captures.name(name) else {
                return Some(total);
            };
            value
                .as_str()
                .parse::<u64>()
                .ok()?
                .checked_mul(unit_seconds)?
                .checked_add(total)
        })
        .unwrap_or(0)
}
