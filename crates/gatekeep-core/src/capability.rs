//! Capability registry: which mechanical operations are supported per language.
//!
//! On disk (base or override):
//!
//! ```json
//! {
//!   "languages": {
//!     "python": { "operations": { "scaffold": true, "rename_symbol": "partial" } }
//!   }
//! }
//! ```
//!
//! Overrides merge per operation: an override entry replaces exactly one
//! `(language, operation)` value and leaves the rest of the base intact.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const OP_SCAFFOLD: &str = "scaffold";
pub const OP_APPLY_DIFF: &str = "apply_diff";
pub const OP_MOVE_FILE: &str = "move_file";
pub const OP_RENAME_SYMBOL: &str = "rename_symbol";

/// Every operation an executor may ask about.
pub const OPERATIONS: [&str; 4] = [OP_SCAFFOLD, OP_APPLY_DIFF, OP_MOVE_FILE, OP_RENAME_SYMBOL];

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("capability registry {source_name} is missing the top-level `languages` object")]
    MissingLanguages { source_name: String },

    #[error("capability registry {source_name}: language `{language}` has no `operations` object")]
    MissingOperations {
        source_name: String,
        language: String,
    },

    #[error("capability registry {source_name}: {language}.{operation} must be true, false or \"partial\", got {value}")]
    InvalidValue {
        source_name: String,
        language: String,
        operation: String,
        value: String,
    },

    #[error("failed to read capability registry {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Three-state support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    Supported,
    Partial,
    Unsupported,
}

impl CapabilityStatus {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(CapabilityStatus::Supported),
            Value::Bool(false) => Some(CapabilityStatus::Unsupported),
            Value::String(s) if s == "partial" => Some(CapabilityStatus::Partial),
            _ => None,
        }
    }

    fn to_value(self) -> Value {
        match self {
            CapabilityStatus::Supported => Value::Bool(true),
            CapabilityStatus::Unsupported => Value::Bool(false),
            CapabilityStatus::Partial => Value::String("partial".into()),
        }
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityStatus::Supported => "supported",
            CapabilityStatus::Partial => "partial",
            CapabilityStatus::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

type Matrix = BTreeMap<String, BTreeMap<String, CapabilityStatus>>;

/// Language -> operation -> status, loaded once per command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityRegistry {
    languages: Matrix,
}

impl CapabilityRegistry {
    /// The matrix shipped with Gatekeep.
    ///
    /// Literal `rename_symbol` substitution is only trusted for python.
    pub fn builtin() -> Self {
        let mut languages = Matrix::new();
        for lang in ["go", "java", "javascript", "python", "rust", "typescript"] {
            let mut ops = BTreeMap::new();
            for op in OPERATIONS {
                let status = if op == OP_RENAME_SYMBOL && lang != "python" {
                    CapabilityStatus::Partial
                } else {
                    CapabilityStatus::Supported
                };
                ops.insert(op.to_string(), status);
            }
            languages.insert(lang.to_string(), ops);
        }
        Self { languages }
    }

    /// Parse and schema-check a registry document.
    pub fn from_value(value: &Value, source_name: &str) -> Result<Self, CapabilityError> {
        let languages = value
            .get("languages")
            .and_then(Value::as_object)
            .ok_or_else(|| CapabilityError::MissingLanguages {
                source_name: source_name.to_string(),
            })?;

        let mut matrix = Matrix::new();
        for (language, entry) in languages {
            let operations = entry
                .get("operations")
                .and_then(Value::as_object)
                .ok_or_else(|| CapabilityError::MissingOperations {
                    source_name: source_name.to_string(),
                    language: language.clone(),
                })?;

            let mut ops = BTreeMap::new();
            for (operation, raw) in operations {
                let status = CapabilityStatus::from_value(raw).ok_or_else(|| {
                    CapabilityError::InvalidValue {
                        source_name: source_name.to_string(),
                        language: language.clone(),
                        operation: operation.clone(),
                        value: raw.to_string(),
                    }
                })?;
                ops.insert(operation.to_ascii_lowercase(), status);
            }
            matrix.insert(language.to_ascii_lowercase(), ops);
        }
        Ok(Self { languages: matrix })
    }

    pub fn from_file(path: &Path) -> Result<Self, CapabilityError> {
        let io = |message: String| CapabilityError::Io {
            path: path.to_path_buf(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| io(e.to_string()))?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| io(e.to_string()))?;
        Self::from_value(&value, &path.display().to_string())
    }

    /// Base matrix (built-in unless a path is given) with an optional override.
    pub fn load(base: Option<&Path>, overrides: Option<&Path>) -> Result<Self, CapabilityError> {
        let mut registry = match base {
            Some(path) => Self::from_file(path)?,
            None => Self::builtin(),
        };
        if let Some(path) = overrides {
            registry.merge(Self::from_file(path)?);
            tracing::debug!(path = %path.display(), "capability override merged");
        }
        Ok(registry)
    }

    /// Merge `overrides` one operation at a time.
    pub fn merge(&mut self, overrides: CapabilityRegistry) {
        for (language, ops) in overrides.languages {
            let base_ops = self.languages.entry(language).or_default();
            for (operation, status) in ops {
                base_ops.insert(operation, status);
            }
        }
    }

    /// Three-state status. Unknown languages and operations are unsupported.
    pub fn get_capability_status(&self, operation: &str, language: &str) -> CapabilityStatus {
        self.languages
            .get(&language.to_ascii_lowercase())
            .and_then(|ops| ops.get(&operation.to_ascii_lowercase()))
            .copied()
            .unwrap_or(CapabilityStatus::Unsupported)
    }

    /// Strict gate: only an explicit `true` is supported. `"partial"` is not.
    pub fn check_capability(&self, operation: &str, language: &str) -> bool {
        self.get_capability_status(operation, language) == CapabilityStatus::Supported
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    /// Every known operation for `language` with its status.
    pub fn operations_for(&self, language: &str) -> BTreeMap<String, CapabilityStatus> {
        let mut out: BTreeMap<String, CapabilityStatus> = OPERATIONS
            .iter()
            .map(|op| (op.to_string(), self.get_capability_status(op, language)))
            .collect();
        if let Some(ops) = self.languages.get(&language.to_ascii_lowercase()) {
            for (op, status) in ops {
                out.insert(op.clone(), *status);
            }
        }
        out
    }

    /// Registry document in the on-disk format.
    pub fn to_value(&self) -> Value {
        let languages: Map<String, Value> = self
            .languages
            .iter()
            .map(|(lang, ops)| {
                let ops: Map<String, Value> = ops
                    .iter()
                    .map(|(op, status)| (op.clone(), status.to_value()))
                    .collect();
                (lang.clone(), serde_json::json!({ "operations": ops }))
            })
            .collect();
        serde_json::json!({ "languages": languages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_matrix() {
        let reg = CapabilityRegistry::builtin();
        assert!(reg.check_capability(OP_SCAFFOLD, "rust"));
        assert!(reg.check_capability(OP_RENAME_SYMBOL, "python"));
        assert_eq!(
            reg.get_capability_status(OP_RENAME_SYMBOL, "rust"),
            CapabilityStatus::Partial
        );
    }

    #[test]
    fn test_only_literal_true_passes_the_gate() {
        let reg = CapabilityRegistry::from_value(
            &json!({"languages": {"python": {"operations": {
                "scaffold": true, "move_file": false, "rename_symbol": "partial"
            }}}}),
            "test",
        )
        .unwrap();
        assert!(reg.check_capability("scaffold", "python"));
        assert!(!reg.check_capability("move_file", "python"));
        assert!(!reg.check_capability("rename_symbol", "python"));
        assert_eq!(
            reg.get_capability_status("rename_symbol", "python"),
            CapabilityStatus::Partial
        );
    }

    #[test]
    fn test_unknown_language_or_operation_is_unsupported() {
        let reg = CapabilityRegistry::builtin();
        assert!(!reg.check_capability(OP_SCAFFOLD, "cobol"));
        assert!(!reg.check_capability("teleport", "python"));
        assert!(!reg.check_capability(OP_SCAFFOLD, "unknown"));
        assert_eq!(
            reg.get_capability_status("teleport", "python"),
            CapabilityStatus::Unsupported
        );
    }

    #[test]
    fn test_override_merges_per_operation() {
        let mut reg = CapabilityRegistry::builtin();
        let overrides = CapabilityRegistry::from_value(
            &json!({"languages": {"rust": {"operations": {"rename_symbol": true}}}}),
            "override",
        )
        .unwrap();
        reg.merge(overrides);

        assert!(reg.check_capability(OP_RENAME_SYMBOL, "rust"));
        // base operations for the same language survive
        assert!(reg.check_capability(OP_SCAFFOLD, "rust"));
        assert!(reg.check_capability(OP_MOVE_FILE, "rust"));
    }

    #[test]
    fn test_override_can_add_language() {
        let mut reg = CapabilityRegistry::builtin();
        reg.merge(
            CapabilityRegistry::from_value(
                &json!({"languages": {"ruby": {"operations": {"scaffold": true}}}}),
                "override",
            )
            .unwrap(),
        );
        assert!(reg.check_capability(OP_SCAFFOLD, "ruby"));
        assert!(!reg.check_capability(OP_MOVE_FILE, "ruby"));
    }

    #[test]
    fn test_schema_rejections() {
        assert!(matches!(
            CapabilityRegistry::from_value(&json!({"python": {}}), "t"),
            Err(CapabilityError::MissingLanguages { .. })
        ));
        assert!(matches!(
            CapabilityRegistry::from_value(&json!({"languages": {"python": {}}}), "t"),
            Err(CapabilityError::MissingOperations { .. })
        ));
        assert!(matches!(
            CapabilityRegistry::from_value(
                &json!({"languages": {"python": {"operations": {"scaffold": "yes"}}}}),
                "t"
            ),
            Err(CapabilityError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_with_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capabilities.json");
        std::fs::write(
            &path,
            r#"{"languages": {"python": {"operations": {"move_file": false}}}}"#,
        )
        .unwrap();
        let reg = CapabilityRegistry::load(None, Some(&path)).unwrap();
        assert!(!reg.check_capability(OP_MOVE_FILE, "python"));
        assert!(reg.check_capability(OP_SCAFFOLD, "python"));
    }

    #[test]
    fn test_to_value_round_trips() {
        let reg = CapabilityRegistry::builtin();
        let back = CapabilityRegistry::from_value(&reg.to_value(), "roundtrip").unwrap();
        assert_eq!(back, reg);
    }
}
