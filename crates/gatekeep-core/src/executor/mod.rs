//! Executors: the only components that change files in the target repository.
//!
//! Every executor is a [`Pipeline`] over a set of [`PipelineStages`]. The
//! pipeline owns the stage order; an executor only says what each stage
//! means for its kind of change:
//!
//! ```text
//! 1 load  2 schema  3 lifecycle  4 capability  5 preconditions
//! 6 diff (archived before any mutation)  7 apply | preview
//! 8 exactly one audit entry  9 ExecutionResult
//! ```

pub mod diff;
pub mod pipeline;
pub mod refactor;
pub mod scaffold;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gatekeep_state::{
    ArtifactEnvelope, ArtifactType, SchemaValidator, StorageError, StoragePort, ValidatorPort,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ExecutorError;

pub use diff::DiffStages;
pub use pipeline::{Pipeline, PipelineStages};
pub use refactor::RefactorStages;
pub use scaffold::{todo_marker, ScaffoldStages};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    DryRun,
    Apply,
}

impl ExecutionMode {
    pub fn is_apply(&self) -> bool {
        matches!(self, ExecutionMode::Apply)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::DryRun => "dry_run",
            ExecutionMode::Apply => "apply",
        })
    }
}

/// What one `execute` call did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub executor: String,
    pub reference: String,
    pub mode: ExecutionMode,
    pub success: bool,
    /// Human-readable progress; "Would ..." in dry runs.
    pub logs: Vec<String>,
    /// Archived diff snapshots written by this call.
    pub diff_paths: Vec<PathBuf>,
    pub files_affected: Vec<String>,
    /// Typed failure; `None` on success.
    pub error: Option<ExecutorError>,
    pub duration_ms: u64,
}

/// A component that turns an approved artifact or diff into a file change.
///
/// `execute` never returns `Err`: failures are carried in the result, and
/// every call leaves exactly one audit entry behind.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, reference: &str, repo_root: &Path, mode: ExecutionMode)
        -> ExecutionResult;
}

// ---------------------------------------------------------------------------
// Shared stage helpers
// ---------------------------------------------------------------------------

fn storage_to_executor(reference: &str, err: StorageError) -> ExecutorError {
    match err {
        StorageError::NotFound { .. } => ExecutorError::ArtifactNotFound {
            reference: reference.to_string(),
        },
        StorageError::Io { path, source } => ExecutorError::io(path, source),
        other => ExecutorError::ArtifactShape {
            reference: reference.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Stage 1 for artifact-backed executors.
///
/// `reference` is either an artifact id or a path to an artifact file,
/// relative to `repo_root`.
pub(crate) fn load_artifact(
    store: &dyn StoragePort,
    reference: &str,
    repo_root: &Path,
    expected: ArtifactType,
) -> Result<ArtifactEnvelope, ExecutorError> {
    let envelope = match Uuid::parse_str(reference.trim()) {
        Ok(id) => store.load_by_id(id, Some(expected)),
        Err(_) => store.load(&repo_root.join(reference)),
    }
    .map_err(|e| storage_to_executor(reference, e))?;

    if envelope.artifact_type() != expected {
        return Err(ExecutorError::ArtifactShape {
            reference: reference.to_string(),
            reason: format!("expected {expected}, found {}", envelope.artifact_type()),
        });
    }
    Ok(envelope)
}

/// Stage 2: re-run payload validation on an already-loaded artifact.
pub(crate) fn revalidate(envelope: &ArtifactEnvelope) -> Result<(), ExecutorError> {
    let reference = envelope.id().to_string();
    let raw = envelope
        .payload()
        .to_value()
        .map_err(|e| storage_to_executor(&reference, e))?;
    SchemaValidator
        .validate_payload(&raw, envelope.artifact_type())
        .map(|_| ())
        .map_err(|e| storage_to_executor(&reference, e))
}

/// Unified diff for one file; `None` on either side means the file is absent.
///
/// Headers use `a/` and `b/` prefixes so the output applies with `git apply -p1`.
pub fn file_diff(path: &str, before: Option<&str>, after: Option<&str>) -> String {
    let old_header = match before {
        Some(_) => format!("a/{path}"),
        None => "/dev/null".to_string(),
    };
    let new_header = match after {
        Some(_) => format!("b/{path}"),
        None => "/dev/null".to_string(),
    };
    similar::TextDiff::from_lines(before.unwrap_or(""), after.unwrap_or(""))
        .unified_diff()
        .context_radius(3)
        .header(&old_header, &new_header)
        .to_string()
}

/// Stage 3: executors act only on APPROVED or LOCKED artifacts.
pub(crate) fn require_approved(envelope: &ArtifactEnvelope) -> Result<(), ExecutorError> {
    if envelope.status().is_approved() {
        Ok(())
    } else {
        Err(ExecutorError::InvalidState {
            reference: envelope.id().to_string(),
            status: envelope.status().to_string(),
            expected: "APPROVED or LOCKED".to_string(),
        })
    }
}
