//! # Journal
//!
//! Append-only, line-delimited JSON log of every planned and attempted
//! operation. It is the only state that outlives a crash and the sole
//! authority for resume and undo.
//!
//! Records are never rewritten. The current state of an operation is the
//! state of the **last** record carrying its id. Every append is followed by
//! `sync_all` before the caller touches the filesystem (for `in-progress`)
//! or moves on (for `done`/`failed`).
//!
//! ```text
//! {"id":0,"state":"planned","source":"/a/p.jpg","destination":"/d/2024/05/p.jpg","kind":"copy","timestamp":"..."}
//! {"id":0,"state":"in-progress",...}
//! {"id":0,"state":"done",...,"digest":"af13..."}
//! ```

use crate::core::hasher::ContentDigest;
use crate::core::plan::{Operation, OperationKind, PlanEntry};
use crate::error::JournalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Journal file name inside the destination root
pub const JOURNAL_FILE_NAME: &str = ".orbit_journal.jsonl";

/// State carried by a journal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordState {
    Planned,
    InProgress,
    Done,
    Failed,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in-progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// One line of the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub id: u64,
    pub state: RecordState,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: OperationKind,
    pub timestamp: DateTime<Utc>,
    /// Verified digest of the destination, only on `done`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<ContentDigest>,
    /// Failure reason, only on `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Latest known state of one operation after replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationState {
    pub id: u64,
    pub state: RecordState,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: OperationKind,
    pub digest: Option<ContentDigest>,
    pub reason: Option<String>,
    /// Position of the latest record in the file, for ordering undo
    pub sequence: usize,
}

impl OperationState {
    pub fn is_done(&self) -> bool {
        self.state == RecordState::Done
    }

    /// Rebuild the executor's view of this operation
    pub fn operation(&self) -> Operation {
        Operation {
            id: self.id,
            source: self.source.clone(),
            destination: self.destination.clone(),
            kind: self.kind,
            expected_digest: None,
        }
    }
}

/// Reduction of a journal file: the last record per id wins
#[derive(Debug, Clone, Default)]
pub struct JournalState {
    operations: BTreeMap<u64, OperationState>,
    /// Lines that could not be parsed (torn writes, corruption)
    pub skipped_lines: usize,
    /// The file ends in the middle of a line
    torn_tail: bool,
}

impl JournalState {
    /// Operations ordered by id
    pub fn operations(&self) -> impl Iterator<Item = &OperationState> {
        self.operations.values()
    }

    pub fn get(&self, id: u64) -> Option<&OperationState> {
        self.operations.get(&id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Operations whose latest state is not `done`, ordered by id
    pub fn pending(&self) -> impl Iterator<Item = &OperationState> {
        self.operations.values().filter(|op| !op.is_done())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn done_count(&self) -> usize {
        self.operations.values().filter(|op| op.is_done()).count()
    }

    pub fn is_finished(&self) -> bool {
        self.pending_count() == 0
    }

    /// Every operation, the one with the most recent record first
    pub fn latest_first(&self) -> Vec<&OperationState> {
        let mut operations: Vec<&OperationState> = self.operations.values().collect();
        operations.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        operations
    }
}

/// Replay a journal file into its current per-operation state.
///
/// Unparseable lines are logged and skipped so a torn final write never
/// prevents recovery.
pub fn replay(path: &Path) -> Result<JournalState, JournalError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => JournalError::NotFound {
            path: path.to_path_buf(),
        },
        _ => JournalError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let mut reader = BufReader::new(file);
    let mut state = JournalState::default();
    let mut line = Vec::new();
    let mut sequence = 0usize;

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|source| JournalError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if read == 0 {
            break;
        }
        state.torn_tail = line.last() != Some(&b'\n');

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<JournalRecord>(&line) {
            Ok(record) => {
                state.operations.insert(
                    record.id,
                    OperationState {
                        id: record.id,
                        state: record.state,
                        source: record.source,
                        destination: record.destination,
                        kind: record.kind,
                        digest: record.digest,
                        reason: record.reason,
                        sequence,
                    },
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping unreadable journal line {} in {}: {}",
                    sequence + 1,
                    path.display(),
                    e
                );
                state.skipped_lines += 1;
            }
        }
        sequence += 1;
    }

    tracing::debug!(
        "Replayed {} operations from {} ({} pending)",
        state.len(),
        path.display(),
        state.pending_count()
    );

    Ok(state)
}

#[derive(Debug, Clone)]
struct PlannedOperation {
    source: PathBuf,
    destination: PathBuf,
    kind: OperationKind,
}

/// Writer side of the journal
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    planned: HashMap<u64, PlannedOperation>,
}

impl Journal {
    /// Start a fresh journal, replacing any file at `path`
    pub fn create(path: &Path) -> Result<Self, JournalError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| JournalError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!("Created journal {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            planned: HashMap::new(),
        })
    }

    /// Reopen an existing journal for appending
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        let state = replay(path)?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|source| JournalError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        // Terminate a torn line so the next record starts cleanly
        if state.torn_tail {
            file.write_all(b"\n")
                .and_then(|_| file.sync_all())
                .map_err(|source| JournalError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            planned: planned_operations(&state),
        })
    }

    /// Reopen a journal on a read-only handle, so every append fails
    #[cfg(test)]
    pub(crate) fn open_read_only(path: &Path) -> Result<Self, JournalError> {
        let state = replay(path)?;
        let file = File::open(path).map_err(|source| JournalError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            planned: planned_operations(&state),
        })
    }

    /// Append a `planned` record for one entry
    pub fn record_planned(&mut self, entry: &PlanEntry) -> Result<(), JournalError> {
        self.record_plan(std::slice::from_ref(entry))
    }

    /// Append `planned` records for a whole plan with a single flush
    pub fn record_plan(&mut self, entries: &[PlanEntry]) -> Result<(), JournalError> {
        let timestamp = Utc::now();
        let mut buffer = Vec::new();

        for entry in entries {
            let planned = PlannedOperation {
                source: entry.source.path.clone(),
                destination: entry.destination.clone(),
                kind: entry.kind(),
            };
            let record = Self::build_record(entry.id, RecordState::Planned, &planned, timestamp);
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
            self.planned.insert(entry.id, planned);
        }

        self.write_durably(&buffer)?;
        tracing::debug!("Journaled {} planned operations", entries.len());
        Ok(())
    }

    /// Mark an operation as started. Must be durable before the filesystem
    /// action begins.
    pub fn record_start(&mut self, id: u64) -> Result<(), JournalError> {
        self.append(id, RecordState::InProgress, None, None)
    }

    pub fn record_done(
        &mut self,
        id: u64,
        digest: Option<ContentDigest>,
    ) -> Result<(), JournalError> {
        self.append(id, RecordState::Done, digest, None)
    }

    pub fn record_failed(&mut self, id: u64, reason: &str) -> Result<(), JournalError> {
        self.append(id, RecordState::Failed, None, Some(reason.to_string()))
    }

    /// Delete the journal file
    pub fn remove(path: &Path) -> Result<(), JournalError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(JournalError::Write {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn append(
        &mut self,
        id: u64,
        state: RecordState,
        digest: Option<ContentDigest>,
        reason: Option<String>,
    ) -> Result<(), JournalError> {
        let planned = self
            .planned
            .get(&id)
            .ok_or(JournalError::UnknownOperation { id })?;

        let mut record = Self::build_record(id, state, planned, Utc::now());
        record.digest = digest;
        record.reason = reason;

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.write_durably(&line)?;

        tracing::debug!("Journal: operation {} -> {}", id, state.as_str());
        Ok(())
    }

    fn build_record(
        id: u64,
        state: RecordState,
        planned: &PlannedOperation,
        timestamp: DateTime<Utc>,
    ) -> JournalRecord {
        JournalRecord {
            id,
            state,
            source: planned.source.clone(),
            destination: planned.destination.clone(),
            kind: planned.kind,
            timestamp,
            digest: None,
            reason: None,
        }
    }

    fn write_durably(&mut self, bytes: &[u8]) -> Result<(), JournalError> {
        let mut file = &self.file;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|source| JournalError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

fn planned_operations(state: &JournalState) -> HashMap<u64, PlannedOperation> {
    state
        .operations()
        .map(|op| {
            (
                op.id,
                PlannedOperation {
                    source: op.source.clone(),
                    destination: op.destination.clone(),
                    kind: op.kind,
                },
            )
        })
        .collect()
}
