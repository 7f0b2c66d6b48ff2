//! Error types for gatekeep-state

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::transition::TransitionError;

/// Why a dependency was refused at admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyProblem {
    /// The referenced artifact does not exist in the store.
    Missing,
    /// The referenced artifact exists but has not been approved yet.
    Draft,
}

impl fmt::Display for DependencyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyProblem::Missing => write!(f, "does not exist"),
            DependencyProblem::Draft => write!(f, "is still DRAFT"),
        }
    }
}

/// Errors raised by storage backends and schema validation.
///
/// Every backend must surface the same variant for the same condition:
/// a missing artifact is always `NotFound`, a malformed one is always
/// `Validation`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No artifact is stored under the given id or path.
    #[error("artifact not found: {reference}")]
    NotFound { reference: String },

    /// Schema validation failed.
    #[error("artifact validation failed: {reason}")]
    Validation { reason: String },

    /// A `depends_on` entry cannot be admitted.
    #[error("artifact {artifact_id} depends on {dependency_id}, which {problem}")]
    Dependency {
        artifact_id: Uuid,
        dependency_id: Uuid,
        problem: DependencyProblem,
    },

    /// The artifact is LOCKED; its stored form can never change again.
    #[error("artifact {id} is LOCKED and immutable; it cannot be overwritten or deleted")]
    Immutable { id: Uuid },

    /// A lifecycle transition was refused.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Filesystem error.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        StorageError::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means "nothing stored here".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
