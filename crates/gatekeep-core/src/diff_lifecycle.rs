//! Raw diff proposals: PENDING -> APPROVED | REJECTED, APPROVED -> APPLIED.
//!
//! Each diff is one JSON file `<diffs_dir>/<uuid>.json`. APPLIED and
//! REJECTED are terminal; nothing moves backwards.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gatekeep_state::write_atomic;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiffStatus::Pending => "PENDING",
            DiffStatus::Approved => "APPROVED",
            DiffStatus::Rejected => "REJECTED",
            DiffStatus::Applied => "APPLIED",
        };
        f.write_str(s)
    }
}

impl DiffStatus {
    /// Legal successor for `to`, or the refused transition.
    pub fn advance(self, to: DiffStatus) -> Result<DiffStatus, (DiffStatus, DiffStatus)> {
        match (self, to) {
            (DiffStatus::Pending, DiffStatus::Approved)
            | (DiffStatus::Pending, DiffStatus::Rejected)
            | (DiffStatus::Approved, DiffStatus::Applied) => Ok(to),
            (from, to) => Err((from, to)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("diff not found: {id}")]
    NotFound { id: String },

    #[error("diff {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: DiffStatus,
        to: DiffStatus,
    },

    #[error("invalid diff proposal: {reason}")]
    Invalid { reason: String },

    #[error("diff record {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("diff io error at {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// A proposed raw unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub id: Uuid,
    pub target_file: String,
    pub content: String,
    pub status: DiffStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub plan_id: Option<Uuid>,
}

/// File-backed diff proposals for one repository.
#[derive(Debug, Clone)]
pub struct DiffLifecycle {
    dir: PathBuf,
}

impl DiffLifecycle {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn write(&self, diff: &Diff) -> Result<(), DiffError> {
        let path = self.path_for(diff.id);
        let json = serde_json::to_vec_pretty(diff).map_err(|e| DiffError::Io {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&path, &json).map_err(|e| DiffError::Io {
            path,
            message: e.to_string(),
        })
    }

    /// Record a new PENDING diff.
    pub fn propose(
        &self,
        target_file: &str,
        content: &str,
        plan_id: Option<Uuid>,
    ) -> Result<Diff, DiffError> {
        if target_file.trim().is_empty() || Path::new(target_file).is_absolute() {
            return Err(DiffError::Invalid {
                reason: format!("target_file must be a relative path, got {target_file:?}"),
            });
        }
        if content.trim().is_empty() {
            return Err(DiffError::Invalid {
                reason: "diff content is empty".to_string(),
            });
        }
        let diff = Diff {
            id: Uuid::new_v4(),
            target_file: target_file.to_string(),
            content: content.to_string(),
            status: DiffStatus::Pending,
            created_at: Utc::now(),
            plan_id,
        };
        self.write(&diff)?;
        tracing::info!(diff = %diff.id, target = %diff.target_file, "diff proposed");
        Ok(diff)
    }

    pub fn get(&self, id: Uuid) -> Result<Diff, DiffError> {
        let path = self.path_for(id);
        let raw = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DiffError::NotFound { id: id.to_string() }
            } else {
                DiffError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                }
            }
        })?;
        serde_json::from_str(&raw).map_err(|e| DiffError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    /// Look a diff up by its textual id.
    pub fn get_str(&self, id: &str) -> Result<Diff, DiffError> {
        let uuid = Uuid::parse_str(id.trim()).map_err(|_| DiffError::NotFound { id: id.to_string() })?;
        self.get(uuid)
    }

    fn advance(&self, id: Uuid, to: DiffStatus) -> Result<Diff, DiffError> {
        let mut diff = self.get(id)?;
        diff.status = diff
            .status
            .advance(to)
            .map_err(|(from, to)| DiffError::InvalidTransition { id, from, to })?;
        self.write(&diff)?;
        tracing::info!(diff = %id, status = %diff.status, "diff status changed");
        Ok(diff)
    }

    pub fn approve(&self, id: Uuid) -> Result<Diff, DiffError> {
        self.advance(id, DiffStatus::Approved)
    }

    pub fn reject(&self, id: Uuid) -> Result<Diff, DiffError> {
        self.advance(id, DiffStatus::Rejected)
    }

    pub fn mark_applied(&self, id: Uuid) -> Result<Diff, DiffError> {
        self.advance(id, DiffStatus::Applied)
    }

    /// Diffs in creation order, optionally filtered by status.
    ///
    /// Unreadable records are skipped with a warning.
    pub fn list(&self, status: Option<DiffStatus>) -> Result<Vec<Diff>, DiffError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DiffError::Io {
                    path: self.dir.clone(),
                    message: e.to_string(),
                })
            }
        };

        let mut diffs: Vec<Diff> = read_dir
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let parsed = fs::read_to_string(&p)
                    .map_err(|e| e.to_string())
                    .and_then(|raw| serde_json::from_str::<Diff>(&raw).map_err(|e| e.to_string()));
                match parsed {
                    Ok(diff) => Some(diff),
                    Err(e) => {
                        tracing::warn!(path = %p.display(), error = %e, "skipping unreadable diff record");
                        None
                    }
                }
            })
            .filter(|d| status.map_or(true, |s| d.status == s))
            .collect();
        diffs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(diffs)
    }
}
