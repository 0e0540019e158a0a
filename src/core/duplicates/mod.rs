//! # Duplicate Detector
//!
//! Groups files by content digest. Names, timestamps and EXIF data play no
//! part: two files are duplicates when their bytes are identical.
//!
//! ## Strategies
//! - **All** - every member is organized (names diverge through conflict
//!   resolution); the group is still reported
//! - **Skip** - the first member in scan order is organized, the rest are
//!   skipped as `duplicate`

use crate::core::hasher::{hash_file, ContentDigest};
use crate::core::plan::FileEntry;
use crate::error::{ErrorStage, ProcessingError, ReportError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// How members of a duplicate group are planned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    #[default]
    All,
    Skip,
}

impl DuplicateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Skip => "skip",
        }
    }
}

/// Outcome for one member of a group
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateDecision {
    Kept,
    Skipped,
}

impl DuplicateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kept => "kept",
            Self::Skipped => "skipped",
        }
    }
}

/// Files sharing one content digest, in scan order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// 1-based, in order of each group's first member
    pub id: usize,
    pub digest: ContentDigest,
    pub size: u64,
    pub members: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// First member in scan order
    pub fn representative(&self) -> &Path {
        &self.members[0]
    }

    pub fn decision(&self, strategy: DuplicateStrategy, member: &Path) -> DuplicateDecision {
        match strategy {
            DuplicateStrategy::All => DuplicateDecision::Kept,
            DuplicateStrategy::Skip if member == self.representative() => DuplicateDecision::Kept,
            DuplicateStrategy::Skip => DuplicateDecision::Skipped,
        }
    }

    /// Bytes saved by keeping a single copy
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.members.len() as u64).saturating_sub(1)
    }
}

/// Finds duplicate groups among scanned files
#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    ignore_empty: bool,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave zero-length files out of every group
    pub fn ignore_empty(mut self, ignore: bool) -> Self {
        self.ignore_empty = ignore;
        self
    }

    /// Hash every entry that has no digest yet, in parallel on the current
    /// rayon pool.
    pub fn digest_all(&self, entries: &mut [FileEntry]) -> Vec<ProcessingError> {
        entries
            .par_iter_mut()
            .filter_map(|entry| self.digest_entry(entry))
            .collect()
    }

    /// Fill in one entry's digest if missing.
    ///
    /// An unreadable file keeps `digest: None` and is reported; it is never
    /// classified as a duplicate.
    pub fn digest_entry(&self, entry: &mut FileEntry) -> Option<ProcessingError> {
        if entry.digest.is_some() {
            return None;
        }
        match hash_file(&entry.path) {
            Ok(digest) => {
                entry.digest = Some(digest);
                None
            }
            Err(e) => {
                tracing::warn!("Treating {} as unique: {}", entry.path.display(), e);
                Some(ProcessingError::new(&entry.path, ErrorStage::Hash, e))
            }
        }
    }

    /// Group already-digested entries. Entries without a digest are ignored.
    pub fn group(&self, entries: &[FileEntry]) -> Vec<DuplicateGroup> {
        let mut order: Vec<&ContentDigest> = Vec::new();
        let mut by_digest: HashMap<&ContentDigest, (u64, Vec<PathBuf>)> = HashMap::new();

        for entry in entries {
            let Some(digest) = entry.digest.as_ref() else {
                continue;
            };
            if self.ignore_empty && entry.size == 0 {
                continue;
            }
            let slot = by_digest.entry(digest).or_insert_with(|| {
                order.push(digest);
                (entry.size, Vec::new())
            });
            slot.1.push(entry.path.clone());
        }

        let groups: Vec<DuplicateGroup> = order
            .into_iter()
            .filter_map(|digest| {
                let (size, members) = by_digest.remove(digest)?;
                (members.len() > 1).then(|| (digest.clone(), size, members))
            })
            .enumerate()
            .map(|(index, (digest, size, members))| DuplicateGroup {
                id: index + 1,
                digest,
                size,
                members,
            })
            .collect();

        tracing::info!(
            "Found {} duplicate groups ({} redundant files)",
            groups.len(),
            groups.iter().map(|g| g.members.len() - 1).sum::<usize>()
        );

        groups
    }

    /// Digest then group
    pub fn detect(&self, entries: &mut [FileEntry]) -> (Vec<DuplicateGroup>, Vec<ProcessingError>) {
        let errors = self.digest_all(entries);
        (self.group(entries), errors)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    group_id: usize,
    digest: &'a str,
    size_bytes: u64,
    source: String,
    decision: &'static str,
}

/// Write one row per group member:
/// `group_id,digest,size_bytes,source,decision`
pub fn export_csv(
    groups: &[DuplicateGroup],
    strategy: DuplicateStrategy,
    path: &Path,
) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ReportError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    if groups.is_empty() {
        writer.write_record(["group_id", "digest", "size_bytes", "source", "decision"])?;
    }
    for group in groups {
        for member in &group.members {
            writer.serialize(CsvRow {
                group_id: group.id,
                digest: group.digest.as_str(),
                size_bytes: group.size,
                source: member.display().to_string(),
                decision: group.decision(strategy, member).as_str(),
            })?;
        }
    }
    writer.flush().map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Duplicate report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> FileEntry {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        FileEntry::new(path, bytes.len() as u64)
    }

    #[test]
    fn identical_bytes_form_a_group() {
        let temp = TempDir::new().unwrap();
        let mut entries = vec![
            write(temp.path(), "a.jpg", b"same bytes"),
            write(temp.path(), "b.jpg", b"different"),
            write(temp.path(), "c.jpg", b"same bytes"),
        ];

        let (groups, errors) = DuplicateDetector::new().detect(&mut entries);

        assert!(errors.is_empty());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, 1);
        assert_eq!(groups[0].members, vec![entries[0].path.clone(), entries[2].path.clone()]);
        assert_eq!(groups[0].wasted_bytes(), 10);
    }

    #[test]
    fn skip_strategy_keeps_first_in_scan_order() {
        let temp = TempDir::new().unwrap();
        let mut forward = vec![
            write(temp.path(), "x.jpg", b"dup"),
            write(temp.path(), "y.jpg", b"dup"),
            write(temp.path(), "z.jpg", b"dup"),
        ];
        let mut reversed: Vec<FileEntry> = forward.iter().rev().cloned().collect();

        let detector = DuplicateDetector::new();
        for entries in [&mut forward, &mut reversed] {
            let (groups, _) = detector.detect(entries);
            let group = &groups[0];
            let kept: Vec<_> = group
                .members
                .iter()
                .filter(|m| group.decision(DuplicateStrategy::Skip, m) == DuplicateDecision::Kept)
                .collect();
            assert_eq!(kept, vec![&entries[0].path]);
        }
    }

    #[test]
    fn all_strategy_keeps_everything() {
        let group = DuplicateGroup {
            id: 1,
            digest: crate::core::hasher::hash_reader(&b"x"[..]).unwrap(),
            size: 1,
            members: vec![PathBuf::from("/a.jpg"), PathBuf::from("/b.jpg")],
        };
        assert_eq!(
            group.decision(DuplicateStrategy::All, Path::new("/b.jpg")),
            DuplicateDecision::Kept
        );
        assert_eq!(
            group.decision(DuplicateStrategy::Skip, Path::new("/b.jpg")),
            DuplicateDecision::Skipped
        );
    }

    #[test]
    fn empty_files_group_unless_ignored() {
        let temp = TempDir::new().unwrap();
        let mut entries = vec![
            write(temp.path(), "e1.jpg", b""),
            write(temp.path(), "e2.jpg", b""),
        ];

        let (groups, _) = DuplicateDetector::new().detect(&mut entries);
        assert_eq!(groups.len(), 1);

        let groups = DuplicateDetector::new().ignore_empty(true).group(&entries);
        assert!(groups.is_empty());
    }

    #[test]
    fn unreadable_file_is_reported_not_grouped() {
        let temp = TempDir::new().unwrap();
        let mut entries = vec![
            write(temp.path(), "a.jpg", b"dup"),
            FileEntry::new(temp.path().join("gone.jpg"), 3),
        ];

        let (groups, errors) = DuplicateDetector::new().detect(&mut entries);

        assert!(groups.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, ErrorStage::Hash);
        assert!(entries[1].digest.is_none());
    }

    #[test]
    fn csv_lists_every_member_with_decision() {
        let temp = TempDir::new().unwrap();
        let mut entries = vec![
            write(temp.path(), "first.jpg", b"dup"),
            write(temp.path(), "second.jpg", b"dup"),
        ];
        let (groups, _) = DuplicateDetector::new().detect(&mut entries);

        let csv_path = temp.path().join("out/dups.csv");
        export_csv(&groups, DuplicateStrategy::Skip, &csv_path).unwrap();

        let content = fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "group_id,digest,size_bytes,source,decision");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].ends_with("first.jpg,kept"));
        assert!(lines[2].ends_with("second.jpg,skipped"));
    }
}
