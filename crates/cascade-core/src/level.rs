use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// A planning horizon. Variant order is the propagation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

/// Propagation order: upward from day to year.
pub const LEVELS_ASCENDING: [Level; 5] = [
    Level::Day,
    Level::Week,
    Level::Month,
    Level::Quarter,
    Level::Year,
];

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Day => "day",
            Level::Week => "week",
            Level::Month => "month",
            Level::Quarter => "quarter",
            Level::Year => "year",
        }
    }

    fn index(self) -> usize {
        LEVELS_ASCENDING
            .iter()
            .position(|l| *l == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cascade level: \"{0}\" (expected day, week, month, quarter, or year)")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Level::Day),
            "week" => Ok(Level::Week),
            "month" => Ok(Level::Month),
            "quarter" => Ok(Level::Quarter),
            "year" => Ok(Level::Year),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Return the next level up in the cascade, or None if already at year.
pub fn next_level_up(level: Level) -> Option<Level> {
    LEVELS_ASCENDING.get(level.index() + 1).copied()
}

/// True if `a` sits strictly above `b` in the cascade.
pub fn is_above(a: Level, b: Level) -> bool {
    a.index() > b.index()
}

// ── Filename patterns ──

fn month_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)-\d{4}\.md$")
            .expect("month pattern is valid")
    })
}

fn quarter_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^q\d-").expect("quarter pattern is valid"))
}

fn year_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-goals\.md$").expect("year pattern is valid"))
}

/// Map a planning file to its level by basename.
/// Returns None for files outside the cascade (tracker.csv, adaptations.md, ...).
pub fn file_to_level(filename: &str) -> Option<Level> {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.starts_with("day-") {
        return Some(Level::Day);
    }
    if name.starts_with("week-") {
        return Some(Level::Week);
    }
    if month_pattern().is_match(&name) {
        return Some(Level::Month);
    }
    if quarter_pattern().is_match(&name) {
        return Some(Level::Quarter);
    }
    if year_pattern().is_match(&name) {
        return Some(Level::Year);
    }
    None
}
