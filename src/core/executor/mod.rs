//! # Executor
//!
//! Performs one copy, move or skip and records it in the journal.
//!
//! The journal is told `in-progress` before the filesystem is touched and
//! `done`/`failed` right after, so a crash in between always leaves the
//! operation visibly unfinished. A copy simply overwrites whatever partial
//! destination an earlier attempt left behind.

use crate::core::hasher::{hash_file, ContentDigest};
use crate::core::journal::Journal;
use crate::core::plan::{Operation, OperationKind};
use crate::error::{ExecutionError, JournalError};
use std::fs;
use std::path::Path;

/// Result of applying one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Done { digest: Option<ContentDigest> },
    Failed { reason: String },
}

impl EntryOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

/// Executes file operations, optionally re-hashing the result
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExecutor {
    verify: bool,
}

impl FileExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-hash every copied destination and compare it with its source
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Journal and perform one operation.
    ///
    /// Execution failures are recorded as `failed` and returned as
    /// [`EntryOutcome::Failed`]; only a journal write failure is an `Err`.
    pub fn apply(
        &self,
        operation: &Operation,
        journal: &mut Journal,
    ) -> Result<EntryOutcome, JournalError> {
        journal.record_start(operation.id)?;

        match self.execute(operation) {
            Ok(digest) => {
                journal.record_done(operation.id, digest.clone())?;
                Ok(EntryOutcome::Done { digest })
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!("{} failed for {}: {}", operation.kind, operation.source.display(), reason);
                journal.record_failed(operation.id, &reason)?;
                Ok(EntryOutcome::Failed { reason })
            }
        }
    }

    /// Perform one operation without journaling.
    ///
    /// Returns the destination digest when it was computed.
    pub fn execute(&self, operation: &Operation) -> Result<Option<ContentDigest>, ExecutionError> {
        match operation.kind {
            OperationKind::Skip => Ok(None),
            OperationKind::Copy => self.copy(operation, self.verify),
            OperationKind::Move => self.move_file(operation),
        }
    }

    fn copy(&self, operation: &Operation, verify: bool) -> Result<Option<ContentDigest>, ExecutionError> {
        let source = &operation.source;
        let destination = &operation.destination;

        if !source.exists() {
            return Err(ExecutionError::SourceMissing {
                path: source.clone(),
            });
        }
        create_parent(destination)?;

        fs::copy(source, destination).map_err(|e| ExecutionError::Copy {
            from: source.clone(),
            to: destination.clone(),
            source: e,
        })?;
        tracing::info!("Copied {} -> {}", source.display(), destination.display());

        if !verify {
            return Ok(None);
        }

        let expected = match operation.expected_digest.clone() {
            Some(digest) => digest,
            None => hash_file(source)?,
        };
        let actual = hash_file(destination)?;
        if actual != expected {
            return Err(ExecutionError::VerificationMismatch {
                source_path: source.clone(),
                destination: destination.clone(),
            });
        }

        Ok(Some(actual))
    }

    fn move_file(&self, operation: &Operation) -> Result<Option<ContentDigest>, ExecutionError> {
        let source = &operation.source;
        let destination = &operation.destination;

        if !source.exists() {
            // A rename that completed just before a crash
            if destination.exists() {
                tracing::info!(
                    "{} already moved to {}",
                    source.display(),
                    destination.display()
                );
                return self.digest_if_verifying(destination);
            }
            return Err(ExecutionError::SourceMissing {
                path: source.clone(),
            });
        }
        create_parent(destination)?;

        match fs::rename(source, destination) {
            Ok(()) => {
                tracing::info!("Moved {} -> {}", source.display(), destination.display());
                self.digest_if_verifying(destination)
            }
            Err(e) => {
                // Crossing filesystems: copy, always verify, then delete
                tracing::debug!(
                    "Rename of {} failed ({}), copying instead",
                    source.display(),
                    e
                );
                let digest = self.copy(operation, true)?;
                fs::remove_file(source).map_err(|e| ExecutionError::RemoveSource {
                    path: source.clone(),
                    source: e,
                })?;
                tracing::info!("Removed {} after verified copy", source.display());
                Ok(digest)
            }
        }
    }

    fn digest_if_verifying(&self, path: &Path) -> Result<Option<ContentDigest>, ExecutionError> {
        if self.verify {
            Ok(Some(hash_file(path)?))
        } else {
            Ok(None)
        }
    }
}

fn create_parent(destination: &Path) -> Result<(), ExecutionError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source| ExecutionError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::hash_reader;
    use crate::core::journal::{replay, RecordState, JOURNAL_FILE_NAME};
    use crate::core::plan::{FileEntry, PlanAction, PlanEntry};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        source: PathBuf,
        destination: PathBuf,
        journal_path: PathBuf,
    }

    fn fixture(content: &[u8]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src/photo.jpg");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, content).unwrap();
        let destination = dir.path().join("dst/2024/05/photo.jpg");
        let journal_path = dir.path().join(JOURNAL_FILE_NAME);
        Fixture {
            _dir: dir,
            source,
            destination,
            journal_path,
        }
    }

    fn operation(f: &Fixture, kind: OperationKind) -> Operation {
        Operation {
            id: 0,
            source: f.source.clone(),
            destination: f.destination.clone(),
            kind,
            expected_digest: None,
        }
    }

    fn journal_for(f: &Fixture, action: PlanAction) -> Journal {
        let mut journal = Journal::create(&f.journal_path).unwrap();
        journal
            .record_planned(&PlanEntry {
                id: 0,
                source: FileEntry::new(&f.source, 0),
                destination: f.destination.clone(),
                action,
                duplicate_group: None,
            })
            .unwrap();
        journal
    }

    #[test]
    fn copy_creates_parents_and_keeps_source() {
        let f = fixture(b"jpeg bytes");
        let executor = FileExecutor::new().with_verification(true);

        let digest = executor.execute(&operation(&f, OperationKind::Copy)).unwrap();

        assert!(f.source.exists());
        assert_eq!(fs::read(&f.destination).unwrap(), b"jpeg bytes");
        assert_eq!(digest, Some(hash_reader(&b"jpeg bytes"[..]).unwrap()));
    }

    #[test]
    fn copy_overwrites_partial_destination() {
        let f = fixture(b"complete content");
        fs::create_dir_all(f.destination.parent().unwrap()).unwrap();
        fs::write(&f.destination, b"compl").unwrap();

        FileExecutor::new()
            .with_verification(true)
            .execute(&operation(&f, OperationKind::Copy))
            .unwrap();

        assert_eq!(fs::read(&f.destination).unwrap(), b"complete content");
    }

    #[test]
    fn verification_mismatch_leaves_destination() {
        let f = fixture(b"actual");
        let mut op = operation(&f, OperationKind::Copy);
        op.expected_digest = Some(hash_reader(&b"something else"[..]).unwrap());

        let result = FileExecutor::new().with_verification(true).execute(&op);

        assert!(matches!(result, Err(ExecutionError::VerificationMismatch { .. })));
        assert!(f.destination.exists());
    }

    #[test]
    fn move_removes_source() {
        let f = fixture(b"move me");
        FileExecutor::new()
            .execute(&operation(&f, OperationKind::Move))
            .unwrap();

        assert!(!f.source.exists());
        assert_eq!(fs::read(&f.destination).unwrap(), b"move me");
    }

    #[test]
    fn completed_rename_is_recognised() {
        let f = fixture(b"already there");
        fs::create_dir_all(f.destination.parent().unwrap()).unwrap();
        fs::rename(&f.source, &f.destination).unwrap();

        let result = FileExecutor::new().execute(&operation(&f, OperationKind::Move));

        assert!(result.is_ok());
    }

    #[test]
    fn missing_source_fails() {
        let f = fixture(b"x");
        fs::remove_file(&f.source).unwrap();

        for kind in [OperationKind::Copy, OperationKind::Move] {
            let result = FileExecutor::new().execute(&operation(&f, kind));
            assert!(matches!(result, Err(ExecutionError::SourceMissing { .. })));
        }
    }

    #[test]
    fn apply_journals_done_with_digest() {
        let f = fixture(b"journaled");
        let mut journal = journal_for(&f, PlanAction::Copy);

        let outcome = FileExecutor::new()
            .with_verification(true)
            .apply(&operation(&f, OperationKind::Copy), &mut journal)
            .unwrap();

        assert!(outcome.is_done());
        let state = replay(&f.journal_path).unwrap();
        let op = state.get(0).unwrap();
        assert_eq!(op.state, RecordState::Done);
        assert!(op.digest.is_some());
    }

    #[test]
    fn apply_journals_failure_and_continues() {
        let f = fixture(b"x");
        fs::remove_file(&f.source).unwrap();
        let mut journal = journal_for(&f, PlanAction::Copy);

        let outcome = FileExecutor::new()
            .apply(&operation(&f, OperationKind::Copy), &mut journal)
            .unwrap();

        assert!(matches!(outcome, EntryOutcome::Failed { .. }));
        let state = replay(&f.journal_path).unwrap();
        assert_eq!(state.get(0).unwrap().state, RecordState::Failed);
        assert!(state.get(0).unwrap().reason.is_some());
    }

    #[test]
    fn skip_is_journaled_done_without_touching_files() {
        let f = fixture(b"dup");
        let mut journal = journal_for(
            &f,
            PlanAction::Skip {
                reason: crate::core::plan::SkipReason::Duplicate,
            },
        );

        let outcome = FileExecutor::new()
            .apply(&operation(&f, OperationKind::Skip), &mut journal)
            .unwrap();

        assert!(outcome.is_done());
        assert!(!f.destination.exists());
        assert!(replay(&f.journal_path).unwrap().is_finished());
    }
}
