//! Diff executor: applies an APPROVED raw diff with `git apply`.
//!
//! This is the only executor that consumes a diff instead of producing one.
//! Before anything is applied the diff must pass, in order: the locked-test
//! check, file authorization, lock integrity, and `git apply --check`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_state::{ArtifactPayload, ArtifactType, StoragePort};

use super::pipeline::PipelineStages;
use super::require_approved;
use crate::capability::OP_APPLY_DIFF;
use crate::diff_lifecycle::{Diff, DiffError, DiffLifecycle, DiffStatus};
use crate::domain::ExecutorError;
use crate::git::git_apply;
use crate::safety::{authorize, resolve_within, touched_files, uses_prefixes, SafetyEnforcer};

pub struct DiffChange {
    content: String,
    strip: u8,
    touched: BTreeSet<String>,
}

pub struct DiffStages {
    diffs: DiffLifecycle,
    store: Arc<dyn StoragePort>,
    safety: SafetyEnforcer,
    timeout_secs: u64,
}

impl DiffStages {
    pub fn new(
        diffs: DiffLifecycle,
        store: Arc<dyn StoragePort>,
        safety: SafetyEnforcer,
        timeout_secs: u64,
    ) -> Self {
        Self {
            diffs,
            store,
            safety,
            timeout_secs,
        }
    }

    /// `target_file`, plus the files of the referenced IMPLEMENTATION_PLAN.
    fn authorized_files(&self, diff: &Diff) -> Result<BTreeSet<String>, ExecutorError> {
        let mut authorized = BTreeSet::from([diff.target_file.clone()]);
        let Some(plan_id) = diff.plan_id else {
            return Ok(authorized);
        };

        let reference = plan_id.to_string();
        let plan = self
            .store
            .load_by_id(plan_id, Some(ArtifactType::ImplementationPlan))
            .map_err(|e| {
                if e.is_not_found() {
                    ExecutorError::ArtifactNotFound {
                        reference: reference.clone(),
                    }
                } else {
                    ExecutorError::ArtifactShape {
                        reference: reference.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;
        require_approved(&plan)?;
        match plan.payload() {
            ArtifactPayload::ImplementationPlan(p) => authorized.extend(p.files.iter().cloned()),
            other => {
                return Err(ExecutorError::ArtifactShape {
                    reference,
                    reason: format!("payload is {}", other.artifact_type()),
                })
            }
        }
        Ok(authorized)
    }
}

fn diff_error(reference: &str, err: DiffError) -> ExecutorError {
    match err {
        DiffError::NotFound { .. } => ExecutorError::ArtifactNotFound {
            reference: reference.to_string(),
        },
        DiffError::InvalidTransition { from, to, .. } => ExecutorError::InvalidState {
            reference: reference.to_string(),
            status: from.to_string(),
            expected: format!("a status that can move to {to}"),
        },
        DiffError::Io { path, message } => ExecutorError::io(path, message),
        DiffError::Corrupt { reason, .. } | DiffError::Invalid { reason } => {
            ExecutorError::ArtifactShape {
                reference: reference.to_string(),
                reason,
            }
        }
    }
}

#[async_trait]
impl PipelineStages for DiffStages {
    type Subject = Diff;
    type Change = DiffChange;

    fn name(&self) -> &'static str {
        "diff"
    }

    fn load(&self, reference: &str, _repo_root: &Path) -> Result<Diff, ExecutorError> {
        self.diffs
            .get_str(reference)
            .map_err(|e| diff_error(reference, e))
    }

    fn validate_schema(&self, diff: &Diff) -> Result<(), ExecutorError> {
        let shape = |reason: &str| ExecutorError::ArtifactShape {
            reference: diff.id.to_string(),
            reason: reason.to_string(),
        };
        if diff.target_file.trim().is_empty() || Path::new(&diff.target_file).is_absolute() {
            return Err(shape("target_file must be a relative path"));
        }
        if touched_files(&diff.content).is_empty() {
            return Err(shape("content is not a unified diff: no file headers found"));
        }
        Ok(())
    }

    fn verify_state(&self, diff: &Diff) -> Result<(), ExecutorError> {
        if diff.status == DiffStatus::Approved {
            Ok(())
        } else {
            Err(ExecutorError::InvalidState {
                reference: diff.id.to_string(),
                status: diff.status.to_string(),
                expected: DiffStatus::Approved.to_string(),
            })
        }
    }

    fn operations(&self, _diff: &Diff) -> Vec<&'static str> {
        vec![OP_APPLY_DIFF]
    }

    async fn preconditions(
        &self,
        diff: &Diff,
        repo_root: &Path,
        _language: &str,
    ) -> Result<DiffChange, ExecutorError> {
        let touched = touched_files(&diff.content);
        for path in &touched {
            resolve_within(repo_root, path)?;
        }

        self.safety
            .check_locked_tests(&touched, self.store.as_ref())?;
        let authorized = self.authorized_files(diff)?;
        authorize(&diff.content, authorized.iter())?;
        self.safety.enforce_lock(repo_root)?;

        let strip = if uses_prefixes(&diff.content) { 1 } else { 0 };
        git_apply(repo_root, &diff.content, true, strip, self.timeout_secs).await?;

        Ok(DiffChange {
            content: diff.content.clone(),
            strip,
            touched,
        })
    }

    fn render_diff(&self, change: &DiffChange) -> String {
        change.content.clone()
    }

    async fn apply(
        &self,
        diff: &Diff,
        change: &DiffChange,
        repo_root: &Path,
    ) -> Result<Vec<String>, ExecutorError> {
        git_apply(repo_root, &change.content, false, change.strip, self.timeout_secs).await?;
        self.diffs
            .mark_applied(diff.id)
            .map_err(|e| diff_error(&diff.id.to_string(), e))?;
        Ok(vec![
            format!(
                "Applied diff {} to {} file(s): {}",
                diff.id,
                change.touched.len(),
                change.touched.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
            format!("Diff {} marked APPLIED", diff.id),
        ])
    }

    fn preview(&self, change: &DiffChange) -> Vec<String> {
        vec![format!(
            "Would apply diff to {} file(s): {} (git apply --check passed)",
            change.touched.len(),
            change.touched.iter().cloned().collect::<Vec<_>>().join(", ")
        )]
    }

    fn files_affected(&self, change: &DiffChange) -> Vec<String> {
        change.touched.iter().cloned().collect()
    }
}
