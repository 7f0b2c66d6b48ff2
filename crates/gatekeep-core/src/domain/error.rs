//! Domain-level error taxonomy for Gatekeep.
//!
//! ```text
//! GatekeepError
//! ├── Artifact   lifecycle and store failures for one artifact
//! ├── Executor   anything an executor pipeline rejects (rides in ExecutionResult)
//! ├── Phase      command issued in the wrong phase / without confirmation
//! ├── Safety     lock integrity and diff authorization
//! └── Capability, Config, Diff, Audit, Storage, Io, Serialization
//! ```

use std::fmt;

use gatekeep_state::{DependencyProblem, StorageError, TransitionError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditError;
use crate::capability::CapabilityError;
use crate::config::ConfigError;
use crate::diff_lifecycle::DiffError;
use crate::phase::Phase;

/// Errors raised while registering or transitioning an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {reference}")]
    NotFound { reference: String },

    #[error("artifact validation failed: {reason}")]
    Validation { reason: String },

    #[error("artifact {id}: {source}")]
    InvalidTransition {
        id: Uuid,
        #[source]
        source: TransitionError,
    },

    #[error("artifact {id} is LOCKED and immutable; no further changes are permitted")]
    Immutable { id: Uuid },

    #[error("artifact {artifact_id} depends on {dependency_id}, which {problem}")]
    Dependency {
        artifact_id: Uuid,
        dependency_id: Uuid,
        problem: DependencyProblem,
    },

    #[error("artifact storage failed: {0}")]
    Storage(#[source] StorageError),
}

impl ArtifactError {
    /// Attach the artifact id to a transition failure.
    pub fn transition(id: Uuid, source: TransitionError) -> Self {
        match source {
            TransitionError::Immutable { .. } => ArtifactError::Immutable { id },
            source => ArtifactError::InvalidTransition { id, source },
        }
    }
}

impl From<StorageError> for ArtifactError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { reference } => ArtifactError::NotFound { reference },
            StorageError::Validation { reason } => ArtifactError::Validation { reason },
            StorageError::Immutable { id } => ArtifactError::Immutable { id },
            StorageError::Dependency {
                artifact_id,
                dependency_id,
                problem,
            } => ArtifactError::Dependency {
                artifact_id,
                dependency_id,
                problem,
            },
            other => ArtifactError::Storage(other),
        }
    }
}

/// Coarse classification of [`ExecutorError`] for programmatic branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Precondition,
    Capability,
    ArtifactShape,
    Lifecycle,
    ApplyFailure,
    Io,
    Audit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Precondition => "precondition",
            ErrorKind::Capability => "capability",
            ErrorKind::ArtifactShape => "artifact_shape",
            ErrorKind::Lifecycle => "lifecycle",
            ErrorKind::ApplyFailure => "apply_failure",
            ErrorKind::Io => "io",
            ErrorKind::Audit => "audit",
        };
        f.write_str(s)
    }
}

/// Typed failure of one executor invocation.
///
/// Cloneable and serializable so it can be carried inside an
/// `ExecutionResult` and written to the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ExecutorError {
    #[error("artifact not found: {reference}")]
    ArtifactNotFound { reference: String },

    #[error("artifact {reference} is malformed: {reason}")]
    ArtifactShape { reference: String, reason: String },

    #[error("{reference} is {status}; executors require {expected}")]
    InvalidState {
        reference: String,
        status: String,
        expected: String,
    },

    #[error("operation `{operation}` is not supported for language `{language}`")]
    CapabilityUnsupported { operation: String, language: String },

    #[error("path {path:?} resolves outside the repository root")]
    PathTraversal { path: String },

    #[error("source file does not exist: {path}")]
    SourceMissing { path: String },

    #[error("destination already exists: {path}")]
    DestinationExists { path: String },

    #[error("rename_symbol requires non-empty old and new symbols")]
    EmptySymbol,

    #[error("diff touches test files locked by test plan {test_plan_id}: {files:?}")]
    LockViolation {
        test_plan_id: Uuid,
        files: Vec<String>,
    },

    #[error("locked test files were modified: {modified:?}")]
    LockIntegrity { modified: Vec<String> },

    #[error("diff touches files outside the authorized set: {files:?}")]
    UnauthorizedFiles { files: Vec<String> },

    #[error("`{command}` failed with exit code {exit_code:?}: {stderr}")]
    ApplyFailed {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("command not found: {command}")]
    CommandNotFound { command: String },

    #[error("io error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("audit log write failed: {message}")]
    Audit { message: String },
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::ArtifactNotFound { .. } | ExecutorError::ArtifactShape { .. } => {
                ErrorKind::ArtifactShape
            }
            ExecutorError::InvalidState { .. } => ErrorKind::Lifecycle,
            ExecutorError::CapabilityUnsupported { .. } => ErrorKind::Capability,
            ExecutorError::PathTraversal { .. }
            | ExecutorError::SourceMissing { .. }
            | ExecutorError::DestinationExists { .. }
            | ExecutorError::EmptySymbol
            | ExecutorError::LockViolation { .. }
            | ExecutorError::LockIntegrity { .. }
            | ExecutorError::UnauthorizedFiles { .. } => ErrorKind::Precondition,
            ExecutorError::ApplyFailed { .. }
            | ExecutorError::Timeout { .. }
            | ExecutorError::CommandNotFound { .. } => ErrorKind::ApplyFailure,
            ExecutorError::Io { .. } => ErrorKind::Io,
            ExecutorError::Audit { .. } => ErrorKind::Audit,
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, err: impl fmt::Display) -> Self {
        ExecutorError::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<SafetyError> for ExecutorError {
    fn from(err: SafetyError) -> Self {
        match err {
            SafetyError::LockIntegrity { modified } => ExecutorError::LockIntegrity { modified },
            SafetyError::UnauthorizedFiles { files } => ExecutorError::UnauthorizedFiles { files },
            SafetyError::MissingTestFile { path } => ExecutorError::SourceMissing { path },
            SafetyError::Io { path, message } => ExecutorError::Io { path, message },
        }
    }
}

/// Errors raised by the command gate.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("`{command}` requires phase {required}, but the project is in {current}")]
    WrongPhase {
        command: String,
        current: Phase,
        required: Phase,
    },

    #[error("`{command}` requires {prerequisite}")]
    MissingPrerequisite {
        command: String,
        prerequisite: String,
    },

    #[error("{action} is irreversible; confirmation required")]
    ConfirmationRequired { action: String },
}

/// Safety invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyError {
    #[error("locked test files were modified: {modified:?}")]
    LockIntegrity { modified: Vec<String> },

    #[error("diff touches files outside the authorized set: {files:?}")]
    UnauthorizedFiles { files: Vec<String> },

    #[error("test file listed in the test plan does not exist: {path}")]
    MissingTestFile { path: String },

    #[error("io error at {path}: {message}")]
    Io { path: String, message: String },
}

/// Gatekeep domain errors.
#[derive(Debug, thiserror::Error)]
pub enum GatekeepError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatekeepError {
    /// Process exit code for this error branch. Never zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            GatekeepError::Io(_) => 1,
            GatekeepError::Phase(_) => 2,
            GatekeepError::Artifact(_) => 3,
            GatekeepError::Executor(_) => 4,
            GatekeepError::Safety(_) => 5,
            GatekeepError::Capability(_) => 6,
            GatekeepError::Config(_) => 7,
            GatekeepError::Diff(_) => 8,
            GatekeepError::Audit(_) => 9,
            GatekeepError::Storage(_) => 10,
            GatekeepError::Serialization(_) => 11,
        }
    }

    /// Suggested next command for the operator, when one exists.
    pub fn remedy(&self) -> Option<String> {
        match self {
            GatekeepError::Phase(PhaseError::WrongPhase { .. })
            | GatekeepError::Phase(PhaseError::MissingPrerequisite { .. }) => {
                Some("gatekeep resume".to_string())
            }
            GatekeepError::Phase(PhaseError::ConfirmationRequired { .. }) => {
                Some("re-run the command with --yes".to_string())
            }
            GatekeepError::Artifact(err) => artifact_remedy(err),
            GatekeepError::Storage(err) => artifact_remedy(&ArtifactError::from_ref(err)?),
            GatekeepError::Executor(err) => executor_remedy(err),
            GatekeepError::Safety(SafetyError::LockIntegrity { modified }) => Some(format!(
                "git checkout -- {}",
                modified.join(" ")
            )),
            GatekeepError::Safety(SafetyError::UnauthorizedFiles { .. }) => Some(
                "gatekeep plan implementation --payload <file> listing the extra files"
                    .to_string(),
            ),
            GatekeepError::Safety(SafetyError::MissingTestFile { .. }) => {
                Some("create the listed test files, then gatekeep lock <id> --yes".to_string())
            }
            GatekeepError::Diff(DiffError::NotFound { .. })
            | GatekeepError::Diff(DiffError::InvalidTransition { .. }) => {
                Some("gatekeep review list".to_string())
            }
            GatekeepError::Capability(_) | GatekeepError::Config(_) => {
                Some("gatekeep diagnose".to_string())
            }
            _ => None,
        }
    }
}

impl ArtifactError {
    fn from_ref(err: &StorageError) -> Option<Self> {
        match err {
            StorageError::NotFound { reference } => Some(ArtifactError::NotFound {
                reference: reference.clone(),
            }),
            StorageError::Dependency {
                artifact_id,
                dependency_id,
                problem,
            } => Some(ArtifactError::Dependency {
                artifact_id: *artifact_id,
                dependency_id: *dependency_id,
                problem: *problem,
            }),
            StorageError::Immutable { id } => Some(ArtifactError::Immutable { id: *id }),
            _ => None,
        }
    }
}

fn artifact_remedy(err: &ArtifactError) -> Option<String> {
    match err {
        ArtifactError::NotFound { .. } | ArtifactError::InvalidTransition { .. } => {
            Some("gatekeep status".to_string())
        }
        ArtifactError::Dependency {
            dependency_id,
            problem: DependencyProblem::Draft,
            ..
        } => Some(format!("gatekeep approve {dependency_id}")),
        ArtifactError::Dependency {
            problem: DependencyProblem::Missing,
            ..
        } => Some("gatekeep status".to_string()),
        ArtifactError::Immutable { .. } => {
            Some("gatekeep plan tests --payload <file> to supersede the locked plan".to_string())
        }
        ArtifactError::Validation { .. } => {
            Some("gatekeep modify <id> --updates <file>".to_string())
        }
        ArtifactError::Storage(_) => None,
    }
}

fn executor_remedy(err: &ExecutorError) -> Option<String> {
    match err {
        ExecutorError::InvalidState { reference, .. } => {
            Some(format!("gatekeep approve {reference}"))
        }
        ExecutorError::ArtifactNotFound { .. } => Some("gatekeep status".to_string()),
        ExecutorError::CapabilityUnsupported { .. } => Some("gatekeep diagnose".to_string()),
        ExecutorError::LockViolation { .. } => Some(
            "locked tests cannot change; target non-test files or start a new test plan"
                .to_string(),
        ),
        ExecutorError::LockIntegrity { modified } => {
            Some(format!("git checkout -- {}", modified.join(" ")))
        }
        ExecutorError::UnauthorizedFiles { .. } => {
            Some("gatekeep impl --target <file> --patch <file> --plan <id>".to_string())
        }
        ExecutorError::ApplyFailed { .. } => Some("gatekeep apply <diff-id> --dry-run".to_string()),
        _ => None,
    }
}

/// Result type for Gatekeep domain operations.
pub type Result<T> = std::result::Result<T, GatekeepError>;
