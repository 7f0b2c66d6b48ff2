//! Refactor executor: `move_file` and `rename_symbol` from an approved
//! REFACTOR_PLAN.
//!
//! Operations are planned against an in-memory overlay of the repository,
//! so a later operation sees the effect of earlier ones. `rename_symbol` is
//! literal substring substitution; it does not understand scopes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_state::{
    ArtifactEnvelope, ArtifactPayload, ArtifactType, RefactorOperation, RefactorPlan, StoragePort,
};

use super::pipeline::PipelineStages;
use super::{file_diff, load_artifact, require_approved, revalidate};
use crate::domain::ExecutorError;
use crate::language::{extensions_for, source_files};
use crate::safety::resolve_within;

pub struct RefactorSubject {
    envelope: ArtifactEnvelope,
    plan: RefactorPlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Move { from: String, to: String },
    Rename { old: String, new: String, files: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FileChange {
    path: String,
    before: Option<String>,
    after: Option<String>,
}

pub struct RefactorChange {
    steps: Vec<Step>,
    /// Sorted by path; only paths whose content actually changes.
    files: Vec<FileChange>,
}

/// Planned repository state: path -> content, `None` for removed.
struct Overlay<'a> {
    root: &'a Path,
    originals: BTreeMap<String, Option<String>>,
    current: BTreeMap<String, Option<String>>,
}

impl<'a> Overlay<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            originals: BTreeMap::new(),
            current: BTreeMap::new(),
        }
    }

    fn read(&mut self, path: &str) -> Result<Option<String>, ExecutorError> {
        if let Some(content) = self.current.get(path) {
            return Ok(content.clone());
        }
        let full = resolve_within(self.root, path)?;
        let content = if full.is_file() {
            Some(std::fs::read_to_string(&full).map_err(|e| ExecutorError::io(&full, e))?)
        } else {
            None
        };
        self.originals.insert(path.to_string(), content.clone());
        self.current.insert(path.to_string(), content.clone());
        Ok(content)
    }

    /// Like [`Overlay::read`], but a file on disk that is not UTF-8 reads as
    /// absent and is left out of the overlay.
    fn read_text(&mut self, path: &str) -> Result<Option<String>, ExecutorError> {
        if self.current.contains_key(path) {
            return self.read(path);
        }
        let full = resolve_within(self.root, path)?;
        if !full.is_file() {
            return self.read(path);
        }
        let bytes = std::fs::read(&full).map_err(|e| ExecutorError::io(&full, e))?;
        let Ok(content) = String::from_utf8(bytes) else {
            tracing::debug!(path, "skipping non-utf8 file");
            return Ok(None);
        };
        self.originals.insert(path.to_string(), Some(content.clone()));
        self.current.insert(path.to_string(), Some(content.clone()));
        Ok(Some(content))
    }

    fn write(&mut self, path: &str, content: Option<String>) -> Result<(), ExecutorError> {
        self.read(path)?;
        self.current.insert(path.to_string(), content);
        Ok(())
    }

    /// Paths that exist in the overlay but were not on disk at the start.
    fn created(&self) -> impl Iterator<Item = &String> {
        self.current
            .iter()
            .filter(|(path, content)| {
                content.is_some() && matches!(self.originals.get(*path), Some(None))
            })
            .map(|(path, _)| path)
    }

    fn into_changes(self) -> Vec<FileChange> {
        let Overlay {
            mut originals,
            current,
            ..
        } = self;
        current
            .into_iter()
            .filter_map(|(path, after)| {
                let before = originals.remove(&path).flatten();
                (before != after).then_some(FileChange {
                    path,
                    before,
                    after,
                })
            })
            .collect()
    }
}

pub struct RefactorStages {
    store: Arc<dyn StoragePort>,
    ignored_dirs: Vec<String>,
}

impl RefactorStages {
    pub fn new(store: Arc<dyn StoragePort>, ignored_dirs: Vec<String>) -> Self {
        Self {
            store,
            ignored_dirs,
        }
    }

    /// Files a `rename_symbol` with no explicit file list applies to.
    fn rename_targets(&self, overlay: &Overlay<'_>, language: &str) -> Vec<String> {
        let extensions = extensions_for(language);
        let matches = |path: &str| {
            Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
        };
        let mut targets: Vec<String> = source_files(overlay.root, &self.ignored_dirs)
            .into_iter()
            .chain(overlay.created().cloned())
            .filter(|p| matches(p))
            .filter(|p| !matches!(overlay.current.get(p), Some(None)))
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }
}

fn move_file(overlay: &mut Overlay<'_>, from: &str, to: &str) -> Result<Step, ExecutorError> {
    let content = overlay
        .read(from)?
        .ok_or_else(|| ExecutorError::SourceMissing {
            path: from.to_string(),
        })?;
    let destination = resolve_within(overlay.root, to)?;
    let occupied = match overlay.current.get(to) {
        Some(planned) => planned.is_some(),
        None => destination.exists(),
    };
    if occupied {
        return Err(ExecutorError::DestinationExists {
            path: to.to_string(),
        });
    }
    overlay.write(from, None)?;
    overlay.write(to, Some(content))?;
    Ok(Step::Move {
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// Substitute `old` with `new` in every target that contains it.
///
/// Explicit targets must exist as text; scanned ones that are missing or
/// binary are skipped.
fn rename_symbol(
    overlay: &mut Overlay<'_>,
    old: &str,
    new: &str,
    targets: Vec<String>,
    explicit: bool,
) -> Result<Step, ExecutorError> {
    let mut changed = Vec::new();
    for path in targets {
        let content = if explicit {
            overlay.read(&path)?
        } else {
            overlay.read_text(&path)?
        };
        let Some(content) = content else {
            if explicit {
                return Err(ExecutorError::SourceMissing { path });
            }
            continue;
        };
        if content.contains(old) {
            overlay.write(&path, Some(content.replace(old, new)))?;
            changed.push(path);
        }
    }
    Ok(Step::Rename {
        old: old.to_string(),
        new: new.to_string(),
        files: changed,
    })
}

#[async_trait]
impl PipelineStages for RefactorStages {
    type Subject = RefactorSubject;
    type Change = RefactorChange;

    fn name(&self) -> &'static str {
        "refactor"
    }

    fn load(&self, reference: &str, repo_root: &Path) -> Result<RefactorSubject, ExecutorError> {
        let envelope = load_artifact(
            self.store.as_ref(),
            reference,
            repo_root,
            ArtifactType::RefactorPlan,
        )?;
        let plan = match envelope.payload() {
            ArtifactPayload::RefactorPlan(plan) => plan.clone(),
            other => {
                return Err(ExecutorError::ArtifactShape {
                    reference: reference.to_string(),
                    reason: format!("payload is {}", other.artifact_type()),
                })
            }
        };
        Ok(RefactorSubject { envelope, plan })
    }

    fn validate_schema(&self, subject: &RefactorSubject) -> Result<(), ExecutorError> {
        revalidate(&subject.envelope)
    }

    fn verify_state(&self, subject: &RefactorSubject) -> Result<(), ExecutorError> {
        require_approved(&subject.envelope)
    }

    fn operations(&self, subject: &RefactorSubject) -> Vec<&'static str> {
        let mut ops: Vec<&'static str> = Vec::new();
        for op in &subject.plan.operations {
            let name = op.operation_name();
            if !ops.contains(&name) {
                ops.push(name);
            }
        }
        ops
    }

    async fn preconditions(
        &self,
        subject: &RefactorSubject,
        repo_root: &Path,
        language: &str,
    ) -> Result<RefactorChange, ExecutorError> {
        let mut overlay = Overlay::new(repo_root);
        let mut steps = Vec::with_capacity(subject.plan.operations.len());

        for op in &subject.plan.operations {
            let step = match op {
                RefactorOperation::MoveFile { from, to } => move_file(&mut overlay, from, to)?,
                RefactorOperation::RenameSymbol { old, new, files } => {
                    if old.is_empty() || new.is_empty() {
                        return Err(ExecutorError::EmptySymbol);
                    }
                    let explicit = !files.is_empty();
                    let targets = if explicit {
                        files.clone()
                    } else {
                        self.rename_targets(&overlay, language)
                    };
                    rename_symbol(&mut overlay, old, new, targets, explicit)?
                }
            };
            steps.push(step);
        }

        Ok(RefactorChange {
            steps,
            files: overlay.into_changes(),
        })
    }

    fn render_diff(&self, change: &RefactorChange) -> String {
        change
            .files
            .iter()
            .map(|f| file_diff(&f.path, f.before.as_deref(), f.after.as_deref()))
            .collect()
    }

    async fn apply(
        &self,
        _subject: &RefactorSubject,
        change: &RefactorChange,
        repo_root: &Path,
    ) -> Result<Vec<String>, ExecutorError> {
        // Writes first, then removals, so a move never loses content.
        for file in change.files.iter().filter(|f| f.after.is_some()) {
            let target = resolve_within(repo_root, &file.path)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ExecutorError::io(parent, e))?;
            }
            let content = file.after.as_deref().unwrap_or_default();
            std::fs::write(&target, content).map_err(|e| ExecutorError::io(&target, e))?;
        }
        for file in change.files.iter().filter(|f| f.after.is_none()) {
            let target = resolve_within(repo_root, &file.path)?;
            std::fs::remove_file(&target).map_err(|e| ExecutorError::io(&target, e))?;
        }

        Ok(change
            .steps
            .iter()
            .map(|step| match step {
                Step::Move { from, to } => format!("Moved {from} -> {to}"),
                Step::Rename { old, new, files } if files.is_empty() => {
                    format!("No occurrences of `{old}` to rename to `{new}`")
                }
                Step::Rename { old, new, files } => format!(
                    "Renamed `{old}` to `{new}` in {} file(s): {}",
                    files.len(),
                    files.join(", ")
                ),
            })
            .collect())
    }

    fn preview(&self, change: &RefactorChange) -> Vec<String> {
        change
            .steps
            .iter()
            .map(|step| match step {
                Step::Move { from, to } => format!("Would move {from} -> {to}"),
                Step::Rename { old, new, files } if files.is_empty() => {
                    format!("Would rename `{old}` to `{new}`: no occurrences found")
                }
                Step::Rename { old, new, files } => format!(
                    "Would rename `{old}` to `{new}` in {} file(s): {}",
                    files.len(),
                    files.join(", ")
                ),
            })
            .collect()
    }

    fn files_affected(&self, change: &RefactorChange) -> Vec<String> {
        change.files.iter().map(|f| f.path.clone()).collect()
    }
}
