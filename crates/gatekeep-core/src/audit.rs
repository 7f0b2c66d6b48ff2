//! Append-only execution audit log and diff archive.
//!
//! Layout under the audit directory:
//!
//! ```text
//! executions.log                          one JSON object per line
//! diffs/<timestamp>_<micros>_<executor>.diff
//! ```
//!
//! Entries are never rewritten or removed. Readers skip lines that do not
//! parse instead of failing the whole history.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::ExecutionMode;

pub const LOG_FILE: &str = "executions.log";
pub const DIFF_DIR: &str = "diffs";

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode audit entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// One executor invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub executor: String,
    pub artifact_ref: String,
    pub mode: ExecutionMode,
    pub outcome: Outcome,
    #[serde(default)]
    pub diff_path: Option<String>,
    #[serde(default)]
    pub files_affected: Vec<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `ErrorKind` of the failure, for filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Handle on one audit directory.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn diff_dir(&self) -> PathBuf {
        self.dir.join(DIFF_DIR)
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> AuditError + '_ {
        move |source| AuditError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Append one entry and flush it to disk.
    pub fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        fs::create_dir_all(&self.dir).map_err(Self::io(&self.dir))?;
        let path = self.log_path();
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Self::io(&path))?;
        file.write_all(line.as_bytes()).map_err(Self::io(&path))?;
        file.flush().map_err(Self::io(&path))?;
        file.sync_data().map_err(Self::io(&path))?;
        Ok(())
    }

    /// Write a diff snapshot and return its path.
    ///
    /// Names carry the timestamp, microseconds and executor; a numeric suffix
    /// is added if two snapshots land in the same microsecond.
    pub fn archive_diff(&self, executor: &str, content: &str) -> Result<PathBuf, AuditError> {
        let dir = self.diff_dir();
        fs::create_dir_all(&dir).map_err(Self::io(&dir))?;

        let now = Utc::now();
        let stem = format!(
            "{}_{:06}_{}",
            now.format("%Y%m%dT%H%M%S"),
            now.timestamp_subsec_micros(),
            executor
        );

        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.diff")
            } else {
                format!("{stem}_{attempt}.diff")
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).map_err(Self::io(&path))?;
                    file.flush().map_err(Self::io(&path))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(Self::io(&path)(e)),
            }
        }
    }

    /// All parseable entries, oldest first.
    pub fn all(&self) -> Result<Vec<AuditLogEntry>, AuditError> {
        let path = self.log_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io(&path)(e)),
        };

        Ok(raw
            .split(|b| *b == b'\n')
            .enumerate()
            .filter_map(|(n, bytes)| match std::str::from_utf8(bytes) {
                Ok(line) => Some((n, line)),
                Err(e) => {
                    tracing::warn!(line = n + 1, error = %e, "skipping non-utf8 audit line");
                    None
                }
            })
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(line = n + 1, error = %e, "skipping malformed audit line");
                    None
                }
            })
            .collect())
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self.all()?.into_iter().rev().take(n).collect())
    }

    /// Every entry for one artifact or diff reference, oldest first.
    pub fn for_artifact(&self, reference: &str) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.artifact_ref == reference)
            .collect())
    }
}
