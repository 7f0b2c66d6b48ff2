use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::StorageError;
use crate::schema::{ArtifactEnvelope, ArtifactType, RegistryEntry};
use crate::storage_traits::{StoragePort, StorageResult};
use crate::validator::{SchemaValidator, ValidatorPort};

const META_DIR: &str = "_meta";
const INDEX_FILE: &str = "index.json";

/// Write `data` to `path` atomically: temp file in the same directory, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| StorageError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    entries: Vec<RegistryEntry>,
}

/// Filesystem-backed artifact store.
///
/// Layout:
/// ```text
/// <root>/<type_dir>/<uuid>.json
/// <root>/_meta/index.json
/// ```
pub struct FsArtifactStore {
    root: PathBuf,
    validator: Box<dyn ValidatorPort>,
}

impl FsArtifactStore {
    /// Open a store rooted at `root`.
    ///
    /// Nothing is created on disk until the first write; a store whose root
    /// does not exist yet simply lists no artifacts.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_validator(root, Box::new(SchemaValidator::new()))
    }

    pub fn with_validator(root: impl AsRef<Path>, validator: Box<dyn ValidatorPort>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            validator,
        }
    }

    /// Create the root and `_meta` directories.
    pub fn init(&self) -> StorageResult<()> {
        let meta = self.meta_dir();
        fs::create_dir_all(&meta).map_err(|e| StorageError::io(&meta, e))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/_meta`, shared with the approval tracker.
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.meta_dir().join(INDEX_FILE)
    }

    fn relative_path(id: Uuid, artifact_type: ArtifactType) -> PathBuf {
        PathBuf::from(artifact_type.dir_name()).join(format!("{id}.json"))
    }

    fn read_index(&self) -> StorageResult<Vec<RegistryEntry>> {
        let path = self.index_path();
        match fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<IndexFile>(&data) {
                Ok(index) => Ok(index.entries),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "corrupt artifact index, rebuilding");
                    self.rebuild_index()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.root.exists() {
                    self.rebuild_index()
                } else {
                    Ok(Vec::new())
                }
            }
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn write_index(&self, mut entries: Vec<RegistryEntry>) -> StorageResult<()> {
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let json = serde_json::to_vec_pretty(&IndexFile { entries })?;
        write_atomic(&self.index_path(), &json)
    }

    /// Rebuild `_meta/index.json` by scanning every type directory.
    ///
    /// Files that fail validation are left out of the index.
    pub fn rebuild_index(&self) -> StorageResult<Vec<RegistryEntry>> {
        let mut entries = Vec::new();
        for artifact_type in ArtifactType::ALL {
            let dir = self.root.join(artifact_type.dir_name());
            let read_dir = match fs::read_dir(&dir) {
                Ok(rd) => rd,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(dir, e)),
            };
            for entry in read_dir.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().map(|e| e != "json").unwrap_or(true) {
                    continue;
                }
                match self.load(&path) {
                    Ok(env) => {
                        let rel = Self::relative_path(env.id(), env.artifact_type());
                        entries.push(RegistryEntry::for_envelope(&env, rel));
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping invalid artifact during index rebuild");
                    }
                }
            }
        }
        self.write_index(entries.clone())?;
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    fn find_entry(&self, id: Uuid) -> StorageResult<Option<RegistryEntry>> {
        Ok(self.read_index()?.into_iter().find(|e| e.id == id))
    }
}

impl StoragePort for FsArtifactStore {
    fn save(&self, artifact: &ArtifactEnvelope) -> StorageResult<PathBuf> {
        self.check_admission(artifact)?;

        let rel = Self::relative_path(artifact.id(), artifact.artifact_type());
        let path = self.root.join(&rel);
        write_atomic(&path, artifact.to_json()?.as_bytes())?;

        let mut entries = self.read_index()?;
        entries.retain(|e| e.id != artifact.id());
        entries.push(RegistryEntry::for_envelope(artifact, rel));
        self.write_index(entries)?;

        tracing::debug!(
            artifact = %artifact.id(),
            artifact_type = %artifact.artifact_type(),
            status = %artifact.status(),
            path = %path.display(),
            "artifact saved"
        );
        Ok(path)
    }

    fn load(&self, path: &Path) -> StorageResult<ArtifactEnvelope> {
        let data = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    reference: path.display().to_string(),
                }
            } else {
                StorageError::io(path, e)
            }
        })?;
        self.validator.validate(&data)
    }

    fn load_by_id(
        &self,
        id: Uuid,
        artifact_type: Option<ArtifactType>,
    ) -> StorageResult<ArtifactEnvelope> {
        let not_found = || StorageError::NotFound {
            reference: id.to_string(),
        };

        let path = match artifact_type {
            Some(t) => self.get_path_for_artifact(id, t),
            None => match self.find_entry(id)? {
                Some(entry) => self.root.join(entry.path),
                None => ArtifactType::ALL
                    .iter()
                    .map(|t| self.get_path_for_artifact(id, *t))
                    .find(|p| p.exists())
                    .ok_or_else(not_found)?,
            },
        };

        match self.load(&path) {
            Err(e) if e.is_not_found() => Err(not_found()),
            other => other,
        }
    }

    fn exists(&self, id: Uuid) -> StorageResult<bool> {
        if self.find_entry(id)?.is_some() {
            return Ok(true);
        }
        Ok(ArtifactType::ALL
            .iter()
            .any(|t| self.get_path_for_artifact(id, *t).exists()))
    }

    fn delete(&self, id: Uuid) -> StorageResult<()> {
        let envelope = self.load_by_id(id, None)?;
        self.ensure_not_locked(id)?;

        let path = self.get_path_for_artifact(id, envelope.artifact_type());
        fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))?;

        let mut entries = self.read_index()?;
        entries.retain(|e| e.id != id);
        self.write_index(entries)
    }

    fn list_by_type(&self, artifact_type: ArtifactType) -> StorageResult<Vec<RegistryEntry>> {
        Ok(self
            .read_index()?
            .into_iter()
            .filter(|e| e.artifact_type == artifact_type)
            .collect())
    }

    fn list_all(&self) -> StorageResult<Vec<RegistryEntry>> {
        self.read_index()
    }

    fn get_path_for_artifact(&self, id: Uuid, artifact_type: ArtifactType) -> PathBuf {
        self.root.join(Self::relative_path(id, artifact_type))
    }
}
