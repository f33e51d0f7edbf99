//! History store: the append-only execution log.
//!
//! One JSON line per record in `<dataDir>/<skill>/execution_history.jsonl`.
//! Appends for a skill are serialized through that skill's lock, written as
//! a single newline-terminated line and synced before returning. Readers
//! ignore an unterminated trailing line, so they never observe a partial
//! record.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StorageError;
use crate::evolution::types::ExecutionRecord;
use crate::storage::{append_line, complete_lines, read_optional, KeyedLocks, SkillPaths};

/// Per-skill cached state guarded by the skill's lock.
#[derive(Debug, Default)]
struct LogState {
    /// Record count, `None` until the log has been scanned.
    count: Option<u64>,
}

/// Durable, per-skill execution history.
#[derive(Debug)]
pub struct HistoryStore {
    data_dir: PathBuf,
    locks: KeyedLocks<LogState>,
}

impl HistoryStore {
    /// Create a store rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            locks: KeyedLocks::new(),
        }
    }

    /// Root data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Append a record and return the skill's record count after the append.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the record cannot be encoded or written.
    pub async fn append(&self, record: &ExecutionRecord) -> Result<u64, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, &record.skill_name)?;
        let path = paths.history();
        let line =
            serde_json::to_string(record).map_err(|e| StorageError::serialization(&path, e))?;

        let lock = self.locks.get(&record.skill_name);
        let mut state = lock.lock().await;

        let current = match state.count {
            Some(count) => count,
            None => {
                let (count, unterminated) = scan(&path).await?;
                if unterminated {
                    // Terminate a torn write so the new record starts on its own line.
                    warn!(
                        skill = %record.skill_name,
                        "Execution history ends with a partial line, terminating it"
                    );
                    append_line(&path, "").await?;
                }
                count
            }
        };

        if let Err(e) = append_line(&path, &line).await {
            state.count = None;
            return Err(e);
        }

        let count = current + 1;
        state.count = Some(count);
        debug!(skill = %record.skill_name, count, "Appended execution record");
        Ok(count)
    }

    /// Most recent `max_count` records, oldest first.
    ///
    /// Lines that fail to parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the log exists but cannot be read.
    pub async fn load_window(
        &self,
        skill_name: &str,
        max_count: usize,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        let path = paths.history();
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(Vec::new());
        };

        let mut records: Vec<ExecutionRecord> = complete_lines(&bytes)
            .enumerate()
            .filter_map(|(index, line)| match serde_json::from_slice(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(
                        skill = %skill_name,
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable execution record"
                    );
                    None
                }
            })
            .collect();

        if records.len() > max_count {
            records.drain(..records.len() - max_count);
        }
        Ok(records)
    }

    /// Number of records stored for a skill.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the log exists but cannot be read.
    pub async fn count(&self, skill_name: &str) -> Result<u64, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        let lock = self.locks.get(skill_name);
        let mut state = lock.lock().await;
        if let Some(count) = state.count {
            return Ok(count);
        }
        let (count, _) = scan(&paths.history()).await?;
        state.count = Some(count);
        Ok(count)
    }
}

/// Count complete lines and report whether the file ends mid-line.
async fn scan(path: &Path) -> Result<(u64, bool), StorageError> {
    let Some(bytes) = read_optional(path).await? else {
        return Ok((0, false));
    };
    let count = complete_lines(&bytes).count() as u64;
    let unterminated = bytes.last().is_some_and(|b| *b != b'\n');
    Ok((count, unterminated))
}
