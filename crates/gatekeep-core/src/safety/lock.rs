//! Test lock records and integrity verification.
//!
//! At lock time every test file is hashed into a `LockRecord` stored at
//! `<project_dir>/.lock`. Verification re-hashes the same files; it has no
//! side effects and can be re-run at any time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gatekeep_state::write_atomic;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::SafetyError;

pub const LOCK_FILE: &str = ".lock";

/// Snapshot of test file hashes taken when a test plan was locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub test_plan_id: Uuid,
    pub locked_at: DateTime<Utc>,
    /// Repository-relative path -> `sha256:<hex>`.
    pub files: BTreeMap<String, String>,
}

/// Outcome of re-hashing the locked files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReport {
    /// `None` when no lock has ever been taken.
    pub test_plan_id: Option<Uuid>,
    pub valid: bool,
    /// Changed or missing files, sorted.
    pub modified: Vec<String>,
}

/// `sha256:<hex>` of a byte slice.
pub fn hash_bytes(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// `sha256:<hex>` of a file's content.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    Ok(hash_bytes(&std::fs::read(path)?))
}

/// Reads and writes the lock record for one repository.
#[derive(Debug, Clone)]
pub struct LockStore {
    path: PathBuf,
}

impl LockStore {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            path: project_dir.as_ref().join(LOCK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash every listed file. A missing file is an error and nothing is written.
    pub fn snapshot(
        &self,
        test_plan_id: Uuid,
        files: &[String],
        repo_root: &Path,
    ) -> Result<LockRecord, SafetyError> {
        let mut hashes = BTreeMap::new();
        for file in files {
            let full = repo_root.join(file);
            if !full.is_file() {
                return Err(SafetyError::MissingTestFile { path: file.clone() });
            }
            let digest = hash_file(&full).map_err(|e| SafetyError::Io {
                path: full.display().to_string(),
                message: e.to_string(),
            })?;
            hashes.insert(file.clone(), digest);
        }
        Ok(LockRecord {
            test_plan_id,
            locked_at: Utc::now(),
            files: hashes,
        })
    }

    pub fn write(&self, record: &LockRecord) -> Result<(), SafetyError> {
        let json = serde_json::to_vec_pretty(record).map_err(|e| SafetyError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        write_atomic(&self.path, &json).map_err(|e| SafetyError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Put back `previous`, or remove the lock file when there was none.
    pub fn restore(&self, previous: Option<&LockRecord>) -> Result<(), SafetyError> {
        match previous {
            Some(record) => self.write(record),
            None => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SafetyError::Io {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }

    /// The current lock record. A missing or corrupt file reads as "never locked".
    pub fn read(&self) -> Option<LockRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "unreadable lock file");
                }
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt lock file ignored");
                None
            }
        }
    }

    /// Re-hash every locked file against its snapshot.
    pub fn verify(&self, repo_root: &Path) -> LockReport {
        let Some(record) = self.read() else {
            return LockReport {
                test_plan_id: None,
                valid: true,
                modified: Vec::new(),
            };
        };

        let modified: Vec<String> = record
            .files
            .iter()
            .filter(|(file, expected)| match hash_file(&repo_root.join(file)) {
                Ok(actual) => &actual != *expected,
                Err(_) => true,
            })
            .map(|(file, _)| file.clone())
            .collect();

        LockReport {
            test_plan_id: Some(record.test_plan_id),
            valid: modified.is_empty(),
            modified,
        }
    }

    /// Fail with every modified path when the lock no longer holds.
    pub fn enforce(&self, repo_root: &Path) -> Result<(), SafetyError> {
        let report = self.verify(repo_root);
        if report.valid {
            Ok(())
        } else {
            Err(SafetyError::LockIntegrity {
                modified: report.modified,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, LockStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tests")).unwrap();
        std::fs::write(dir.path().join("tests/test_a.py"), "def test_a(): pass\n").unwrap();
        std::fs::write(dir.path().join("tests/test_b.py"), "def test_b(): pass\n").unwrap();
        let store = LockStore::new(dir.path().join(".project"));
        (dir, store)
    }

    fn lock(dir: &Path, store: &LockStore) -> LockRecord {
        let record = store
            .snapshot(
                Uuid::new_v4(),
                &["tests/test_a.py".into(), "tests/test_b.py".into()],
                dir,
            )
            .unwrap();
        store.write(&record).unwrap();
        record
    }

    #[test]
    fn test_hash_format() {
        let h = hash_bytes(b"abc");
        assert!(h.starts_with("sha256:"));
        assert_eq!(h.len(), "sha256:".len() + 64);
    }

    #[test]
    fn test_no_lock_is_vacuously_valid() {
        let (dir, store) = setup();
        let report = store.verify(dir.path());
        assert!(report.valid);
        assert!(report.test_plan_id.is_none());
        store.enforce(dir.path()).unwrap();
    }

    #[test]
    fn test_untouched_files_verify() {
        let (dir, store) = setup();
        lock(dir.path(), &store);
        assert!(store.verify(dir.path()).valid);
        // idempotent
        assert!(store.verify(dir.path()).valid);
    }

    #[test]
    fn test_one_byte_change_is_detected() {
        let (dir, store) = setup();
        lock(dir.path(), &store);
        std::fs::write(dir.path().join("tests/test_b.py"), "def test_b(): pasS\n").unwrap();

        let report = store.verify(dir.path());
        assert!(!report.valid);
        assert_eq!(report.modified, vec!["tests/test_b.py".to_string()]);
    }

    #[test]
    fn test_deleted_file_is_reported() {
        let (dir, store) = setup();
        lock(dir.path(), &store);
        std::fs::remove_file(dir.path().join("tests/test_a.py")).unwrap();

        let err = store.enforce(dir.path()).unwrap_err();
        assert_eq!(
            err,
            SafetyError::LockIntegrity {
                modified: vec!["tests/test_a.py".to_string()]
            }
        );
    }

    #[test]
    fn test_missing_file_at_snapshot_fails() {
        let (dir, store) = setup();
        let err = store
            .snapshot(Uuid::new_v4(), &["tests/nope.py".into()], dir.path())
            .unwrap_err();
        assert!(matches!(err, SafetyError::MissingTestFile { .. }));
        assert!(store.read().is_none());
    }

    #[test]
    fn test_corrupt_lock_reads_as_none() {
        let (dir, store) = setup();
        std::fs::create_dir_all(dir.path().join(".project")).unwrap();
        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.read().is_none());
        assert!(store.verify(dir.path()).valid);
    }
}
