//! Approval records kept beside the artifact index.
//!
//! `artifacts/_meta/approvals.json` maps artifact id to who approved it and
//! when. A corrupt file reads as empty; the artifact status is authoritative.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gatekeep_state::{write_atomic, StorageError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const APPROVALS_FILE: &str = "approvals.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub artifact_id: Uuid,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ApprovalTracker {
    path: PathBuf,
}

impl ApprovalTracker {
    /// Tracker over `<meta_dir>/approvals.json`.
    pub fn new(meta_dir: impl AsRef<Path>) -> Self {
        Self {
            path: meta_dir.as_ref().join(APPROVALS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> BTreeMap<Uuid, Approval> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "unreadable approvals file");
                }
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "corrupt approvals file ignored");
            BTreeMap::new()
        })
    }

    fn write(&self, approvals: &BTreeMap<Uuid, Approval>) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(approvals)?;
        write_atomic(&self.path, &json)
    }

    pub fn record(&self, artifact_id: Uuid, approved_by: &str) -> Result<Approval, StorageError> {
        let approval = Approval {
            artifact_id,
            approved_by: approved_by.to_string(),
            approved_at: Utc::now(),
        };
        let mut all = self.read();
        all.insert(artifact_id, approval.clone());
        self.write(&all)?;
        Ok(approval)
    }

    /// Drop the approval for `artifact_id`; returns it if one existed.
    pub fn clear(&self, artifact_id: Uuid) -> Result<Option<Approval>, StorageError> {
        let mut all = self.read();
        let removed = all.remove(&artifact_id);
        if removed.is_some() {
            self.write(&all)?;
        }
        Ok(removed)
    }

    pub fn get(&self, artifact_id: Uuid) -> Option<Approval> {
        self.read().remove(&artifact_id)
    }

    /// Every recorded approval, oldest first.
    pub fn all(&self) -> Vec<Approval> {
        let mut approvals: Vec<Approval> = self.read().into_values().collect();
        approvals.sort_by(|a, b| {
            a.approved_at
                .cmp(&b.approved_at)
                .then(a.artifact_id.cmp(&b.artifact_id))
        });
        approvals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_get_clear() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ApprovalTracker::new(dir.path().join("_meta"));
        let id = Uuid::new_v4();

        assert!(tracker.get(id).is_none());
        tracker.record(id, "alice").unwrap();
        assert_eq!(tracker.get(id).unwrap().approved_by, "alice");
        assert_eq!(tracker.all().len(), 1);

        assert!(tracker.clear(id).unwrap().is_some());
        assert!(tracker.get(id).is_none());
        assert!(tracker.clear(id).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ApprovalTracker::new(dir.path());
        std::fs::write(tracker.path(), "{nope").unwrap();
        assert!(tracker.all().is_empty());

        let id = Uuid::new_v4();
        tracker.record(id, "bob").unwrap();
        assert_eq!(tracker.get(id).unwrap().approved_by, "bob");
    }
}
