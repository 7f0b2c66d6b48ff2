//! Storage trait definitions for Gatekeep
//!
//! `StoragePort` is the contract every artifact backend satisfies. Backends
//! are synchronous: a command is one pipeline run to completion and the only
//! I/O is local file access.
//!
//! Guarantees shared by all backends:
//! - `save` runs [`StoragePort::check_admission`] before anything is written.
//! - A missing artifact is `StorageError::NotFound`; a malformed one is
//!   `StorageError::Validation`.
//! - A stored LOCKED artifact is never overwritten or deleted.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{DependencyProblem, StorageError};
use crate::schema::{ArtifactEnvelope, ArtifactStatus, ArtifactType, RegistryEntry};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Artifact persistence.
pub trait StoragePort: Send + Sync {
    /// Persist an artifact and return the path it was written to.
    fn save(&self, artifact: &ArtifactEnvelope) -> StorageResult<PathBuf>;

    /// Load and validate the artifact stored at `path`.
    fn load(&self, path: &Path) -> StorageResult<ArtifactEnvelope>;

    /// Load by id, optionally narrowing the search to one type.
    fn load_by_id(
        &self,
        id: Uuid,
        artifact_type: Option<ArtifactType>,
    ) -> StorageResult<ArtifactEnvelope>;

    /// Whether an artifact with this id is stored.
    fn exists(&self, id: Uuid) -> StorageResult<bool>;

    /// Remove an artifact. Refused for LOCKED artifacts.
    fn delete(&self, id: Uuid) -> StorageResult<()>;

    /// Index entries for one type, in creation order.
    fn list_by_type(&self, artifact_type: ArtifactType) -> StorageResult<Vec<RegistryEntry>>;

    /// All index entries, in creation order.
    fn list_all(&self) -> StorageResult<Vec<RegistryEntry>>;

    /// Where an artifact of this id and type lives (or would live).
    fn get_path_for_artifact(&self, id: Uuid, artifact_type: ArtifactType) -> PathBuf;

    /// Admission rules applied before any write.
    ///
    /// - Every `depends_on` id must exist and be APPROVED or LOCKED.
    /// - An artifact already stored as LOCKED can never be replaced.
    fn check_admission(&self, artifact: &ArtifactEnvelope) -> StorageResult<()> {
        for dependency_id in artifact.depends_on() {
            let problem = match self.load_by_id(*dependency_id, None) {
                Ok(dep) if dep.status().is_approved() => continue,
                Ok(_) => DependencyProblem::Draft,
                Err(e) if e.is_not_found() => DependencyProblem::Missing,
                Err(e) => return Err(e),
            };
            tracing::warn!(
                artifact = %artifact.id(),
                dependency = %dependency_id,
                %problem,
                "dependency refused"
            );
            return Err(StorageError::Dependency {
                artifact_id: artifact.id(),
                dependency_id: *dependency_id,
                problem,
            });
        }

        self.ensure_not_locked(artifact.id())
    }

    /// Fail with `Immutable` when the stored copy of `id` is LOCKED.
    fn ensure_not_locked(&self, id: Uuid) -> StorageResult<()> {
        match self.load_by_id(id, None) {
            Ok(existing) if existing.status() == ArtifactStatus::Locked => {
                Err(StorageError::Immutable { id })
            }
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Entries of one type in the given status.
    fn list_by_status(
        &self,
        artifact_type: ArtifactType,
        status: ArtifactStatus,
    ) -> StorageResult<Vec<RegistryEntry>> {
        Ok(self
            .list_by_type(artifact_type)?
            .into_iter()
            .filter(|e| e.status == status)
            .collect())
    }

    /// Whether any artifact of this type is APPROVED or LOCKED.
    fn has_approved(&self, artifact_type: ArtifactType) -> StorageResult<bool> {
        Ok(self
            .list_by_type(artifact_type)?
            .iter()
            .any(|e| e.status.is_approved()))
    }
}
