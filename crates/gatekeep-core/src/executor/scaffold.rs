//! Scaffold executor: creates the files and directories of an approved
//! SCAFFOLD_PLAN. Existing paths are skipped, never overwritten.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use gatekeep_state::{
    ArtifactEnvelope, ArtifactPayload, ArtifactType, EntryKind, ScaffoldPlan, StoragePort,
};

use super::pipeline::PipelineStages;
use super::{file_diff, load_artifact, require_approved, revalidate};
use crate::capability::OP_SCAFFOLD;
use crate::domain::ExecutorError;
use crate::safety::resolve_within;

/// Placeholder content for a new file, commented in the file's own syntax.
pub fn todo_marker(path: &str, description: &str) -> String {
    let text = if description.trim().is_empty() {
        format!("TODO: implement {path}")
    } else {
        format!("TODO: {}", description.trim())
    };
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "py" | "sh" | "bash" | "rb" | "toml" | "yaml" | "yml" | "cfg" | "ini" | "r" => {
            format!("# {text}\n")
        }
        "rs" | "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" | "go" | "java" | "kt" | "c" | "h"
        | "cpp" | "hpp" | "cs" | "swift" | "scala" => format!("// {text}\n"),
        "md" | "html" | "xml" => format!("<!-- {text} -->\n"),
        "sql" | "lua" | "hs" => format!("-- {text}\n"),
        "css" => format!("/* {text} */\n"),
        // No comment syntax we can rely on.
        "json" => String::new(),
        _ => format!("{text}\n"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    CreateFile(String),
    CreateDir,
    Skip,
}

#[derive(Debug, Clone)]
pub struct ScaffoldStep {
    path: String,
    target: PathBuf,
    action: Action,
}

pub struct ScaffoldSubject {
    envelope: ArtifactEnvelope,
    plan: ScaffoldPlan,
}

pub struct ScaffoldStages {
    store: Arc<dyn StoragePort>,
}

impl ScaffoldStages {
    pub fn new(store: Arc<dyn StoragePort>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PipelineStages for ScaffoldStages {
    type Subject = ScaffoldSubject;
    type Change = Vec<ScaffoldStep>;

    fn name(&self) -> &'static str {
        "scaffold"
    }

    fn load(&self, reference: &str, repo_root: &Path) -> Result<ScaffoldSubject, ExecutorError> {
        let envelope = load_artifact(
            self.store.as_ref(),
            reference,
            repo_root,
            ArtifactType::ScaffoldPlan,
        )?;
        let plan = match envelope.payload() {
            ArtifactPayload::ScaffoldPlan(plan) => plan.clone(),
            other => {
                return Err(ExecutorError::ArtifactShape {
                    reference: reference.to_string(),
                    reason: format!("payload is {}", other.artifact_type()),
                })
            }
        };
        Ok(ScaffoldSubject { envelope, plan })
    }

    fn validate_schema(&self, subject: &ScaffoldSubject) -> Result<(), ExecutorError> {
        revalidate(&subject.envelope)
    }

    fn verify_state(&self, subject: &ScaffoldSubject) -> Result<(), ExecutorError> {
        require_approved(&subject.envelope)
    }

    fn operations(&self, _subject: &ScaffoldSubject) -> Vec<&'static str> {
        vec![OP_SCAFFOLD]
    }

    fn declared_language(&self, subject: &ScaffoldSubject) -> Option<String> {
        subject.plan.language.clone()
    }

    async fn preconditions(
        &self,
        subject: &ScaffoldSubject,
        repo_root: &Path,
        _language: &str,
    ) -> Result<Vec<ScaffoldStep>, ExecutorError> {
        let mut seen = BTreeSet::new();
        let mut steps = Vec::with_capacity(subject.plan.files.len());
        for entry in &subject.plan.files {
            let path = entry.path.trim_end_matches('/').to_string();
            let target = resolve_within(repo_root, &path)?;
            if !seen.insert(target.clone()) {
                return Err(ExecutorError::ArtifactShape {
                    reference: subject.envelope.id().to_string(),
                    reason: format!("path {path} is listed more than once"),
                });
            }
            let action = if target.exists() {
                Action::Skip
            } else if entry.kind == EntryKind::Directory {
                Action::CreateDir
            } else {
                Action::CreateFile(todo_marker(&path, &entry.description))
            };
            steps.push(ScaffoldStep {
                path,
                target,
                action,
            });
        }
        Ok(steps)
    }

    fn render_diff(&self, change: &Vec<ScaffoldStep>) -> String {
        change
            .iter()
            .filter_map(|step| match &step.action {
                Action::CreateFile(content) => Some(file_diff(&step.path, None, Some(content))),
                _ => None,
            })
            .collect()
    }

    async fn apply(
        &self,
        _subject: &ScaffoldSubject,
        change: &Vec<ScaffoldStep>,
        _repo_root: &Path,
    ) -> Result<Vec<String>, ExecutorError> {
        let mut logs = Vec::with_capacity(change.len());
        for step in change {
            match &step.action {
                Action::Skip => logs.push(format!("Skipped {} (already exists)", step.path)),
                Action::CreateDir => {
                    fs::create_dir_all(&step.target)
                        .map_err(|e| ExecutorError::io(&step.target, e))?;
                    logs.push(format!("Created directory {}/", step.path));
                }
                Action::CreateFile(content) => {
                    if let Some(parent) = step.target.parent() {
                        fs::create_dir_all(parent).map_err(|e| ExecutorError::io(parent, e))?;
                    }
                    let mut file = OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(&step.target)
                        .map_err(|e| ExecutorError::io(&step.target, e))?;
                    file.write_all(content.as_bytes())
                        .map_err(|e| ExecutorError::io(&step.target, e))?;
                    logs.push(format!("Created {}", step.path));
                }
            }
        }
        Ok(logs)
    }

    fn preview(&self, change: &Vec<ScaffoldStep>) -> Vec<String> {
        change
            .iter()
            .map(|step| match step.action {
                Action::Skip => format!("Would skip {} (already exists)", step.path),
                Action::CreateDir => format!("Would create directory {}/", step.path),
                Action::CreateFile(_) => format!("Would create {}", step.path),
            })
            .collect()
    }

    fn files_affected(&self, change: &Vec<ScaffoldStep>) -> Vec<String> {
        change
            .iter()
            .filter(|step| step.action != Action::Skip)
            .map(|step| step.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_todo_marker_uses_comment_syntax() {
        assert_eq!(todo_marker("src/b.py", ""), "# TODO: implement src/b.py\n");
        assert_eq!(todo_marker("src/lib.rs", "entry point"), "// TODO: entry point\n");
        assert_eq!(
            todo_marker("README.md", ""),
            "<!-- TODO: implement README.md -->\n"
        );
        assert_eq!(todo_marker("db/init.sql", "schema"), "-- TODO: schema\n");
        assert_eq!(todo_marker("Makefile", ""), "TODO: implement Makefile\n");
        assert!(todo_marker("package.json", "").is_empty());
    }
}
