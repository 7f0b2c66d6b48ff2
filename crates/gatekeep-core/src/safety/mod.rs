//! Safety enforcement: immutable test locks and diff authorization.
//!
//! The two guarantees are independent:
//! - lock integrity compares locked test files with their lock-time hashes;
//! - diff authorization refuses a diff that touches any file outside the
//!   authorized set, and any test file while a test plan is LOCKED.

pub mod authorization;
pub mod lock;
pub mod paths;
pub mod patterns;

use std::collections::BTreeSet;
use std::path::Path;

use gatekeep_state::{ArtifactStatus, ArtifactType, StoragePort};

use crate::domain::{ExecutorError, SafetyError};
use crate::obs::emit_lock_violation;

pub use authorization::{authorize, touched_files, unauthorized_files, uses_prefixes};
pub use lock::{hash_bytes, hash_file, LockRecord, LockReport, LockStore};
pub use paths::{display_relative, resolve_within};
pub use patterns::TestPatterns;

/// Owns the lock store and compiled test patterns for one repository.
#[derive(Debug, Clone)]
pub struct SafetyEnforcer {
    lock: LockStore,
    patterns: TestPatterns,
}

impl SafetyEnforcer {
    pub fn new(lock: LockStore, patterns: TestPatterns) -> Self {
        Self { lock, patterns }
    }

    pub fn lock_store(&self) -> &LockStore {
        &self.lock
    }

    pub fn patterns(&self) -> &TestPatterns {
        &self.patterns
    }

    pub fn verify_lock(&self, repo_root: &Path) -> LockReport {
        self.lock.verify(repo_root)
    }

    pub fn enforce_lock(&self, repo_root: &Path) -> Result<(), SafetyError> {
        self.lock.enforce(repo_root)
    }

    /// Refuse `touched` when it includes a test file and a test plan is LOCKED.
    ///
    /// A file counts as a test file when it matches the configured patterns
    /// or appears in the lock record.
    pub fn check_locked_tests(
        &self,
        touched: &BTreeSet<String>,
        store: &dyn StoragePort,
    ) -> Result<(), ExecutorError> {
        let locked = store
            .list_by_status(ArtifactType::TestPlan, ArtifactStatus::Locked)
            .map_err(|e| ExecutorError::ArtifactShape {
                reference: ArtifactType::TestPlan.to_string(),
                reason: e.to_string(),
            })?;
        let Some(latest) = locked.last() else {
            return Ok(());
        };

        let record = self.lock.read();
        let locked_files: BTreeSet<&String> = record
            .as_ref()
            .map(|r| r.files.keys().collect())
            .unwrap_or_default();

        let files: Vec<String> = touched
            .iter()
            .filter(|f| self.patterns.is_test_file(f) || locked_files.contains(f))
            .cloned()
            .collect();
        if files.is_empty() {
            return Ok(());
        }

        let test_plan_id = record.map(|r| r.test_plan_id).unwrap_or(latest.id);
        emit_lock_violation(&test_plan_id.to_string(), &files);
        Err(ExecutorError::LockViolation {
            test_plan_id,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatekeepConfig;
    use gatekeep_state::{
        ArtifactEnvelope, ArtifactPayload, LifecycleAction, MemoryArtifactStore, TestPlan,
    };

    fn enforcer(project_dir: &Path) -> SafetyEnforcer {
        SafetyEnforcer::new(
            LockStore::new(project_dir),
            TestPatterns::new(&GatekeepConfig::default().test_patterns).unwrap(),
        )
    }

    fn touched(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_locked_plan_allows_test_edits() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryArtifactStore::new();
        enforcer(dir.path())
            .check_locked_tests(&touched(&["tests/test_x.py"]), &store)
            .unwrap();
    }

    #[test]
    fn test_locked_plan_blocks_test_edits() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryArtifactStore::new();
        let plan = ArtifactEnvelope::draft(
            ArtifactPayload::TestPlan(TestPlan {
                description: String::new(),
                test_files: vec!["tests/test_x.py".into()],
            }),
            "alice",
            [],
        )
        .unwrap()
        .transition(LifecycleAction::Approve)
        .unwrap()
        .transition(LifecycleAction::Lock)
        .unwrap();
        store.save(&plan).unwrap();

        let err = enforcer(dir.path())
            .check_locked_tests(&touched(&["src/x.py", "tests/test_x.py"]), &store)
            .unwrap_err();
        assert_eq!(
            err,
            ExecutorError::LockViolation {
                test_plan_id: plan.id(),
                files: vec!["tests/test_x.py".into()],
            }
        );

        enforcer(dir.path())
            .check_locked_tests(&touched(&["src/x.py"]), &store)
            .unwrap();
    }
}
