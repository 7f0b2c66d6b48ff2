//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryArtifactStore` satisfies the `StoragePort` contract without touching
//! the filesystem. Artifacts are kept as JSON text and validated on every
//! load, the same way the filesystem backend treats its files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::error::StorageError;
use crate::schema::{ArtifactEnvelope, ArtifactType, RegistryEntry};
use crate::storage_traits::{StoragePort, StorageResult};
use crate::validator::{SchemaValidator, ValidatorPort};

#[derive(Debug, Clone)]
struct Stored {
    artifact_type: ArtifactType,
    json: String,
}

/// In-memory artifact store backed by a `BTreeMap<Uuid, json>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<BTreeMap<Uuid, Stored>>,
    validator: SchemaValidator,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, BTreeMap<Uuid, Stored>> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the stored text of an artifact, bypassing validation.
    ///
    /// Lets tests simulate on-disk corruption.
    pub fn corrupt(&self, id: Uuid, raw: impl Into<String>) {
        if let Some(stored) = self.guard().get_mut(&id) {
            stored.json = raw.into();
        }
    }

    fn id_from_path(path: &Path) -> Option<Uuid> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    fn entries(&self) -> Vec<RegistryEntry> {
        let snapshot: Vec<(Uuid, Stored)> = self
            .guard()
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect();

        let mut entries: Vec<RegistryEntry> = snapshot
            .into_iter()
            .filter_map(|(id, stored)| match self.validator.validate(&stored.json) {
                Ok(env) => Some(RegistryEntry::for_envelope(
                    &env,
                    self.get_path_for_artifact(id, stored.artifact_type),
                )),
                Err(e) => {
                    tracing::warn!(artifact = %id, error = %e, "skipping invalid artifact");
                    None
                }
            })
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        entries
    }
}

impl StoragePort for MemoryArtifactStore {
    fn save(&self, artifact: &ArtifactEnvelope) -> StorageResult<PathBuf> {
        self.check_admission(artifact)?;
        let json = artifact.to_json()?;
        self.guard().insert(
            artifact.id(),
            Stored {
                artifact_type: artifact.artifact_type(),
                json,
            },
        );
        Ok(self.get_path_for_artifact(artifact.id(), artifact.artifact_type()))
    }

    fn load(&self, path: &Path) -> StorageResult<ArtifactEnvelope> {
        let not_found = || StorageError::NotFound {
            reference: path.display().to_string(),
        };
        let id = Self::id_from_path(path).ok_or_else(not_found)?;
        let json = self.guard().get(&id).map(|s| s.json.clone()).ok_or_else(not_found)?;
        self.validator.validate(&json)
    }

    fn load_by_id(
        &self,
        id: Uuid,
        artifact_type: Option<ArtifactType>,
    ) -> StorageResult<ArtifactEnvelope> {
        let stored = self
            .guard()
            .get(&id)
            .cloned()
            .filter(|s| artifact_type.map_or(true, |t| t == s.artifact_type))
            .ok_or_else(|| StorageError::NotFound {
                reference: id.to_string(),
            })?;
        self.validator.validate(&stored.json)
    }

    fn exists(&self, id: Uuid) -> StorageResult<bool> {
        Ok(self.guard().contains_key(&id))
    }

    fn delete(&self, id: Uuid) -> StorageResult<()> {
        if !self.exists(id)? {
            return Err(StorageError::NotFound {
                reference: id.to_string(),
            });
        }
        self.ensure_not_locked(id)?;
        self.guard().remove(&id);
        Ok(())
    }

    fn list_by_type(&self, artifact_type: ArtifactType) -> StorageResult<Vec<RegistryEntry>> {
        Ok(self
            .entries()
            .into_iter()
            .filter(|e| e.artifact_type == artifact_type)
            .collect())
    }

    fn list_all(&self) -> StorageResult<Vec<RegistryEntry>> {
        Ok(self.entries())
    }

    fn get_path_for_artifact(&self, id: Uuid, artifact_type: ArtifactType) -> PathBuf {
        PathBuf::from(artifact_type.dir_name()).join(format!("{id}.json"))
    }
}
