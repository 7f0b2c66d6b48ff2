//! Type-specific artifact payloads.
//!
//! Each [`ArtifactType`] has exactly one payload struct. [`ArtifactPayload`]
//! ties the two together so an envelope can never carry a payload of the
//! wrong type.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::schema::ArtifactType;

/// Top-level project intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPlan {
    pub name: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// One component named in an architecture plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub responsibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitecturePlan {
    pub summary: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// What a scaffold entry creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    #[default]
    Source,
    Test,
    Config,
    Doc,
    Directory,
}

/// A single file or directory to scaffold.
///
/// Deserializes from either a bare path string (`"src/a.py"`) or a full
/// object (`{"path": ..., "description": ..., "kind": ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScaffoldEntryRepr")]
pub struct ScaffoldEntry {
    pub path: String,
    pub description: String,
    pub kind: EntryKind,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScaffoldEntryRepr {
    Path(String),
    Full {
        path: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        kind: EntryKind,
    },
}

impl From<ScaffoldEntryRepr> for ScaffoldEntry {
    fn from(repr: ScaffoldEntryRepr) -> Self {
        match repr {
            ScaffoldEntryRepr::Path(path) => ScaffoldEntry {
                path,
                description: String::new(),
                kind: EntryKind::Source,
            },
            ScaffoldEntryRepr::Full {
                path,
                description,
                kind,
            } => ScaffoldEntry {
                path,
                description,
                kind,
            },
        }
    }
}

impl ScaffoldEntry {
    pub fn new(path: impl Into<String>, description: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldPlan {
    /// Explicit target language; when absent the repository is inspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub files: Vec<ScaffoldEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    #[serde(default)]
    pub description: String,
    /// Repository-relative test files whose content is frozen at lock time.
    pub test_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationPlan {
    pub summary: String,
    /// Files that diffs proposed under this plan may touch.
    #[serde(default)]
    pub files: Vec<String>,
}

/// A mechanical refactor step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RefactorOperation {
    MoveFile {
        from: String,
        to: String,
    },
    /// Literal substring substitution, not scope-aware.
    RenameSymbol {
        old: String,
        new: String,
        #[serde(default)]
        files: Vec<String>,
    },
}

impl RefactorOperation {
    /// Capability registry operation name.
    pub fn operation_name(&self) -> &'static str {
        match self {
            RefactorOperation::MoveFile { .. } => "move_file",
            RefactorOperation::RenameSymbol { .. } => "rename_symbol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactorPlan {
    #[serde(default)]
    pub description: String,
    pub operations: Vec<RefactorOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub output_tail: String,
    #[serde(default = "default_true")]
    pub lock_valid: bool,
    #[serde(default)]
    pub modified_files: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub summary: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// A payload tagged with its artifact type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArtifactPayload {
    ProjectPlan(ProjectPlan),
    ArchitecturePlan(ArchitecturePlan),
    ScaffoldPlan(ScaffoldPlan),
    TestPlan(TestPlan),
    ImplementationPlan(ImplementationPlan),
    RefactorPlan(RefactorPlan),
    ValidationResult(ValidationResult),
    ReconciliationPlan(ReconciliationPlan),
}

impl ArtifactPayload {
    /// The artifact type this payload belongs to.
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            ArtifactPayload::ProjectPlan(_) => ArtifactType::ProjectPlan,
            ArtifactPayload::ArchitecturePlan(_) => ArtifactType::ArchitecturePlan,
            ArtifactPayload::ScaffoldPlan(_) => ArtifactType::ScaffoldPlan,
            ArtifactPayload::TestPlan(_) => ArtifactType::TestPlan,
            ArtifactPayload::ImplementationPlan(_) => ArtifactType::ImplementationPlan,
            ArtifactPayload::RefactorPlan(_) => ArtifactType::RefactorPlan,
            ArtifactPayload::ValidationResult(_) => ArtifactType::ValidationResult,
            ArtifactPayload::ReconciliationPlan(_) => ArtifactType::ReconciliationPlan,
        }
    }

    /// Parse raw JSON as the payload of `artifact_type` and check its rules.
    pub fn from_value(
        artifact_type: ArtifactType,
        raw: serde_json::Value,
    ) -> Result<Self, StorageError> {
        fn parse<T: serde::de::DeserializeOwned>(
            artifact_type: ArtifactType,
            raw: serde_json::Value,
        ) -> Result<T, StorageError> {
            serde_json::from_value(raw).map_err(|e| {
                StorageError::validation(format!("invalid {artifact_type} payload: {e}"))
            })
        }

        let payload = match artifact_type {
            ArtifactType::ProjectPlan => ArtifactPayload::ProjectPlan(parse(artifact_type, raw)?),
            ArtifactType::ArchitecturePlan => {
                ArtifactPayload::ArchitecturePlan(parse(artifact_type, raw)?)
            }
            ArtifactType::ScaffoldPlan => {
                ArtifactPayload::ScaffoldPlan(parse(artifact_type, raw)?)
            }
            ArtifactType::TestPlan => ArtifactPayload::TestPlan(parse(artifact_type, raw)?),
            ArtifactType::ImplementationPlan => {
                ArtifactPayload::ImplementationPlan(parse(artifact_type, raw)?)
            }
            ArtifactType::RefactorPlan => {
                ArtifactPayload::RefactorPlan(parse(artifact_type, raw)?)
            }
            ArtifactType::ValidationResult => {
                ArtifactPayload::ValidationResult(parse(artifact_type, raw)?)
            }
            ArtifactType::ReconciliationPlan => {
                ArtifactPayload::ReconciliationPlan(parse(artifact_type, raw)?)
            }
        };
        payload.check()?;
        Ok(payload)
    }

    /// Serialize back to a JSON value.
    pub fn to_value(&self) -> Result<serde_json::Value, StorageError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Semantic rules beyond what serde enforces.
    pub fn check(&self) -> Result<(), StorageError> {
        match self {
            ArtifactPayload::ProjectPlan(p) => require_text("name", &p.name),
            ArtifactPayload::ArchitecturePlan(p) => {
                require_text("summary", &p.summary)?;
                for c in &p.components {
                    require_text("components[].name", &c.name)?;
                }
                Ok(())
            }
            ArtifactPayload::ScaffoldPlan(p) => {
                if p.files.is_empty() {
                    return Err(StorageError::validation(
                        "scaffold plan must list at least one file",
                    ));
                }
                for entry in &p.files {
                    require_relative("files[].path", &entry.path)?;
                }
                Ok(())
            }
            ArtifactPayload::TestPlan(p) => {
                for f in &p.test_files {
                    require_relative("test_files[]", f)?;
                }
                Ok(())
            }
            ArtifactPayload::ImplementationPlan(p) => {
                require_text("summary", &p.summary)?;
                for f in &p.files {
                    require_relative("files[]", f)?;
                }
                Ok(())
            }
            ArtifactPayload::RefactorPlan(p) => {
                if p.operations.is_empty() {
                    return Err(StorageError::validation(
                        "refactor plan must list at least one operation",
                    ));
                }
                for op in &p.operations {
                    match op {
                        RefactorOperation::MoveFile { from, to } => {
                            require_relative("operations[].from", from)?;
                            require_relative("operations[].to", to)?;
                        }
                        RefactorOperation::RenameSymbol { old, new, files } => {
                            require_text("operations[].old", old)?;
                            require_text("operations[].new", new)?;
                            for f in files {
                                require_relative("operations[].files[]", f)?;
                            }
                        }
                    }
                }
                Ok(())
            }
            ArtifactPayload::ValidationResult(_) => Ok(()),
            ArtifactPayload::ReconciliationPlan(p) => require_text("summary", &p.summary),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        return Err(StorageError::validation(format!(
            "field `{field}` must not be empty"
        )));
    }
    Ok(())
}

fn require_relative(field: &str, value: &str) -> Result<(), StorageError> {
    require_text(field, value)?;
    if value.starts_with('/') || value.starts_with('\\') || value.contains('\0') {
        return Err(StorageError::validation(format!(
            "field `{field}` must be a relative path, got {value:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scaffold_entry_accepts_bare_string() {
        let payload = ArtifactPayload::from_value(
            ArtifactType::ScaffoldPlan,
            json!({"files": ["src/a.py", {"path": "tests/test_a.py", "kind": "test"}]}),
        )
        .unwrap();
        let ArtifactPayload::ScaffoldPlan(plan) = payload else {
            panic!("expected scaffold plan");
        };
        assert_eq!(plan.files[0].path, "src/a.py");
        assert_eq!(plan.files[0].kind, EntryKind::Source);
        assert_eq!(plan.files[1].kind, EntryKind::Test);
    }

    #[test]
    fn test_empty_scaffold_rejected() {
        let err = ArtifactPayload::from_value(ArtifactType::ScaffoldPlan, json!({"files": []}))
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[test]
    fn test_absolute_path_rejected() {
        let err = ArtifactPayload::from_value(
            ArtifactType::TestPlan,
            json!({"test_files": ["/etc/passwd"]}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("relative"));
    }

    #[test]
    fn test_wrong_shape_for_type_rejected() {
        // A project plan payload is not a valid refactor plan.
        let err = ArtifactPayload::from_value(ArtifactType::RefactorPlan, json!({"name": "x"}))
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[test]
    fn test_refactor_operation_tagging() {
        let payload = ArtifactPayload::from_value(
            ArtifactType::RefactorPlan,
            json!({"operations": [
                {"op": "move_file", "from": "a.py", "to": "b.py"},
                {"op": "rename_symbol", "old": "foo", "new": "bar"}
            ]}),
        )
        .unwrap();
        let ArtifactPayload::RefactorPlan(plan) = payload else {
            panic!("expected refactor plan");
        };
        assert_eq!(plan.operations[0].operation_name(), "move_file");
        assert_eq!(plan.operations[1].operation_name(), "rename_symbol");
    }

    #[test]
    fn test_payload_type_matches() {
        let payload =
            ArtifactPayload::from_value(ArtifactType::ProjectPlan, json!({"name": "demo"}))
                .unwrap();
        assert_eq!(payload.artifact_type(), ArtifactType::ProjectPlan);
    }
}
