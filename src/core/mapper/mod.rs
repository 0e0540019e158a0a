//! # Path Mapper
//!
//! Computes where each photo goes in the destination tree.
//!
//! Mapping is a pure function of the source path, the capture timestamp and
//! the [`DatePattern`]; collisions across the whole plan are then settled by
//! [`resolve_conflicts`].

mod conflict;
mod pattern;

pub use conflict::{resolve_conflicts, MAX_NUMERIC_SUFFIX};
pub use pattern::{DatePattern, DEFAULT_PATTERN, SUPPORTED_CODES};

use crate::error::PlanError;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Directory for photos without a capture timestamp
pub const UNSORTED_DIR: &str = "Unsorted";

/// Maps a source file to its destination relative to the destination root
#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    pattern: DatePattern,
}

impl PathMapper {
    pub fn new(pattern: DatePattern) -> Self {
        Self { pattern }
    }

    pub fn pattern(&self) -> &DatePattern {
        &self.pattern
    }

    /// `<pattern directory>/<base name>`, or `Unsorted/<base name>` when the
    /// timestamp is unknown
    pub fn map(
        &self,
        source: &Path,
        captured: Option<NaiveDateTime>,
    ) -> Result<PathBuf, PlanError> {
        let name = source
            .file_name()
            .ok_or_else(|| PlanError::MissingFileName {
                path: source.to_path_buf(),
            })?;

        let directory = match captured {
            Some(timestamp) => self.pattern.directory_for(timestamp),
            None => PathBuf::from(UNSORTED_DIR),
        };

        Ok(directory.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn mapper(pattern: &str) -> PathMapper {
        PathMapper::new(DatePattern::new(pattern).unwrap())
    }

    #[test]
    fn maps_timestamp_to_pattern_directory() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let dest = mapper("%Y/%m").map(Path::new("/a/2023/p.jpg"), Some(ts)).unwrap();
        assert_eq!(dest, PathBuf::from("2024/05/p.jpg"));
    }

    #[test]
    fn unknown_timestamp_goes_to_unsorted() {
        let dest = mapper("%Y/%m").map(Path::new("/a/p.jpg"), None).unwrap();
        assert_eq!(dest, PathBuf::from("Unsorted/p.jpg"));
    }

    #[test]
    fn path_without_file_name_is_an_error() {
        let result = mapper("%Y").map(Path::new("/"), None);
        assert!(matches!(result, Err(PlanError::MissingFileName { .. })));
    }

    #[test]
    fn mapped_collisions_resolve_by_ancestor() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let m = mapper("%Y/%m");
        let candidates: Vec<(PathBuf, PathBuf)> = ["/a/2023/p.jpg", "/b/2023/p.jpg"]
            .iter()
            .map(|s| {
                let source = PathBuf::from(s);
                let dest = m.map(&source, Some(ts)).unwrap();
                (source, dest)
            })
            .collect();

        let resolved: Vec<PathBuf> = resolve_conflicts(&candidates, |_| false)
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            resolved,
            vec![
                PathBuf::from("2024/05/p_a.jpg"),
                PathBuf::from("2024/05/p_b.jpg")
            ]
        );
    }
}
