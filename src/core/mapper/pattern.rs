//! Validated strftime-style destination patterns.

use crate::error::PatternError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Layout used when none is configured
pub const DEFAULT_PATTERN: &str = "%Y/%m/%d";

/// Format codes a pattern may use
pub const SUPPORTED_CODES: &[char] = &[
    'Y', 'y', 'm', 'd', 'B', 'b', 'A', 'a', 'H', 'M', 'S', '%',
];

/// A relative directory layout such as `%Y/%m` or `%Y/%B/%d`.
///
/// Only the codes in [`SUPPORTED_CODES`] are accepted so formatting can
/// never fail once a pattern has been built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatePattern {
    raw: String,
}

impl DatePattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let raw = pattern.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
            return Err(PatternError::NotRelative(raw.to_string()));
        }

        if raw.split(['/', '\\']).any(|segment| segment == "." || segment == "..") {
            return Err(PatternError::NotRelative(raw.to_string()));
        }

        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                continue;
            }
            match chars.next() {
                Some(code) if SUPPORTED_CODES.contains(&code) => {}
                Some(code) => {
                    return Err(PatternError::UnsupportedCode {
                        pattern: raw.to_string(),
                        code: format!("%{}", code),
                    })
                }
                None => {
                    return Err(PatternError::UnsupportedCode {
                        pattern: raw.to_string(),
                        code: "%".to_string(),
                    })
                }
            }
        }

        Ok(Self {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Relative directory for a capture timestamp. Empty segments are dropped.
    pub fn directory_for(&self, timestamp: NaiveDateTime) -> PathBuf {
        let formatted = timestamp.format(&self.raw).to_string();
        formatted
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect()
    }
}

impl Default for DatePattern {
    fn default() -> Self {
        Self {
            raw: DEFAULT_PATTERN.to_string(),
        }
    }
}

impl fmt::Display for DatePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for DatePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DatePattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DatePattern> for String {
    fn from(pattern: DatePattern) -> Self {
        pattern.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn may_day() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    #[test]
    fn formats_year_and_month() {
        let pattern = DatePattern::new("%Y/%m").unwrap();
        assert_eq!(pattern.directory_for(may_day()), PathBuf::from("2024/05"));
    }

    #[test]
    fn formats_names_and_time() {
        let pattern = DatePattern::new("%Y/%B/%a_%H%M%S").unwrap();
        assert_eq!(
            pattern.directory_for(may_day()),
            PathBuf::from("2024/May/Wed_140709")
        );
    }

    #[test]
    fn empty_segments_are_dropped() {
        let pattern = DatePattern::new("%Y//%m/").unwrap();
        assert_eq!(pattern.directory_for(may_day()), PathBuf::from("2024/05"));
    }

    #[test]
    fn rejects_unsupported_codes() {
        let err = DatePattern::new("%Y/%j").unwrap_err();
        assert_eq!(
            err,
            PatternError::UnsupportedCode {
                pattern: "%Y/%j".to_string(),
                code: "%j".to_string(),
            }
        );
        assert!(DatePattern::new("%Y/%").is_err());
    }

    #[test]
    fn percent_escape_is_literal() {
        let pattern = DatePattern::new("%Y/100%%").unwrap();
        assert_eq!(pattern.directory_for(may_day()), PathBuf::from("2024/100%"));
    }

    #[test]
    fn rejects_absolute_and_traversal() {
        assert!(matches!(
            DatePattern::new("/%Y"),
            Err(PatternError::NotRelative(_))
        ));
        assert!(matches!(
            DatePattern::new("%Y/../%m"),
            Err(PatternError::NotRelative(_))
        ));
        assert_eq!(DatePattern::new("  "), Err(PatternError::Empty));
    }
}
