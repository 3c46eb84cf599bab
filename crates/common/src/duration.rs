//! Human-readable duration parsing and formatting.
//!
//! Durations are written as a sequence of `<number><unit>` tokens (`1d 12h`,
//! `2mo`, `90m`). A bare integer is read as seconds. Years are 365 days and
//! months 30 days.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::TimeUnitsConfig;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const MONTH: u64 = 30 * DAY;
const YEAR: u64 = 365 * DAY;

static BARE_SECONDS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^\s*(\d+)\s*$").unwrap()
});

/// Keywords accepted as "never expires".
const PERMANENT_KEYWORDS: &[&str] = &["permanent", "perm", "never", "forever"];

/// Parsed expiration spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Never expires.
    Never,
    /// Expires after the given number of seconds.
    After(u64),
}

/// Parser/formatter bound to a set of unit suffixes.
#[derive(Debug, Clone)]
pub struct DurationParser {
    token: Regex,
    units: Vec<(String, u64)>,
    permanent_label: String,
}

impl DurationParser {
    /// Build a parser for the configured unit suffixes.
    #[must_use]
    pub fn new(config: &TimeUnitsConfig) -> Self {
        let mut units = vec![
            (config.years.clone(), YEAR),
            (config.months.clone(), MONTH),
            (config.days.clone(), DAY),
            (config.hours.clone(), HOUR),
            (config.minutes.clone(), MINUTE),
            (config.seconds.clone(), 1),
        ];
        units.retain(|(suffix, _)| !suffix.is_empty());

        // Longest suffix first so "mo" wins over "m".
        let mut alternation: Vec<&str> = units.iter().map(|(s, _)| s.as_str()).collect();
        alternation.sort_by_key(|s| std::cmp::Reverse(s.len()));
        let pattern = format!(
            r"(\d+)\s*({})",
            alternation
                .iter()
                .map(|s| regex::escape(s))
                .collect::<Vec<_>>()
                .join("|")
        );

        // Escaped literals always form a valid pattern.
        #[allow(clippy::unwrap_used)]
        let token = Regex::new(&pattern).unwrap();

        Self {
            token,
            units,
            permanent_label: config.permanent.clone(),
        }
    }

    /// Parse a duration into seconds.
    ///
    /// Returns `None` for empty, invalid or zero-length input.
    #[must_use]
    pub fn parse(&self, text: &str) -> Option<u64> {
        if let Some(caps) = BARE_SECONDS.captures(text) {
            return caps[1].parse::<u64>().ok().filter(|s| *s > 0);
        }

        let mut total: u64 = 0;
        let mut matched = false;
        for caps in self.token.captures_iter(text) {
            matched = true;
            let value: u64 = caps[1].parse().ok()?;
            let multiplier = self
                .units
                .iter()
                .find(|(suffix, _)| suffix == &caps[2])
                .map(|(_, m)| *m)?;
            total = total.checked_add(value.checked_mul(multiplier)?)?;
        }

        (matched && total > 0).then_some(total)
    }

    /// Parse an expiration spec, accepting the permanent keywords.
    #[must_use]
    pub fn parse_expiration(&self, text: &str) -> Option<Expiration> {
        let trimmed = text.trim();
        if PERMANENT_KEYWORDS
            .iter()
            .any(|k| trimmed.eq_ignore_ascii_case(k))
            || trimmed.eq_ignore_ascii_case(&self.permanent_label)
        {
            return Some(Expiration::Never);
        }
        self.parse(trimmed).map(Expiration::After)
    }

    /// Whether the text is a parseable duration or a permanent keyword.
    #[must_use]
    pub fn is_valid(&self, text: &str) -> bool {
        self.parse_expiration(text).is_some()
    }

    /// Format seconds as `1y 2mo 3d 4h 5m 6s`, omitting zero components.
    ///
    /// Zero or negative input formats as the permanent label.
    #[must_use]
    pub fn format(&self, seconds: i64) -> String {
        if seconds <= 0 {
            return self.permanent_label.clone();
        }

        let mut remaining = seconds as u64;
        let mut parts = Vec::new();
        for (suffix, size) in &self.units {
            let count = remaining / size;
            if count > 0 {
                parts.push(format!("{count}{suffix}"));
                remaining %= size;
            }
        }
        parts.join(" ")
    }

    /// Label used for durations that never end.
    #[must_use]
    pub fn permanent_label(&self) -> &str {
        &self.permanent_label
    }
}

impl Default for DurationParser {
    fn default() -> Self {
        Self::new(&TimeUnitsConfig::default())
    }
}
