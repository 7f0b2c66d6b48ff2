//! Project configuration loaded from `.project/config.toml`.
//!
//! Every field has a default, so a missing file yields a working
//! configuration. A file that exists but does not parse is a hard error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration file location relative to the repository root.
pub const CONFIG_FILE: &str = ".project/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid test pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubprocessConfig {
    /// Upper bound for `git apply` and test runs.
    pub timeout_secs: u64,
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeepConfig {
    pub artifacts_dir: PathBuf,
    pub audit_dir: PathBuf,
    pub project_dir: PathBuf,
    pub diffs_dir: PathBuf,
    pub default_author: String,
    /// Regexes matched against repository-relative, `/`-separated paths.
    pub test_patterns: Vec<String>,
    /// argv for `gatekeep validate`; empty means "pick by detected language".
    pub test_command: Vec<String>,
    /// Replaces the built-in capability matrix when set.
    pub capability_base: Option<PathBuf>,
    /// Per-operation override merged over the base matrix.
    pub capability_override: Option<PathBuf>,
    pub subprocess: SubprocessConfig,
}

impl Default for GatekeepConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            audit_dir: PathBuf::from("audit"),
            project_dir: PathBuf::from(".project"),
            diffs_dir: PathBuf::from("diffs"),
            default_author: "operator".to_string(),
            test_patterns: default_test_patterns(),
            test_command: Vec::new(),
            capability_base: None,
            capability_override: None,
            subprocess: SubprocessConfig::default(),
        }
    }
}

fn default_test_patterns() -> Vec<String> {
    [
        r"(^|/)tests?/",
        r"(^|/)test_[^/]*\.py$",
        r"_test\.(py|go)$",
        r"\.(test|spec)\.[jt]sx?$",
        r"Tests?\.java$",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl GatekeepConfig {
    /// Load `<repo_root>/.project/config.toml`, or defaults when absent.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        let path = repo_root.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path,
            message: e.to_string(),
        })
    }

    pub fn artifacts_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.artifacts_dir)
    }

    pub fn audit_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.audit_dir)
    }

    pub fn project_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.project_dir)
    }

    pub fn diffs_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(&self.diffs_dir)
    }

    /// The override registry to merge, if any.
    ///
    /// Falls back to `<project_dir>/capabilities.json` when it exists.
    pub fn capability_override_path(&self, repo_root: &Path) -> Option<PathBuf> {
        match &self.capability_override {
            Some(p) => Some(repo_root.join(p)),
            None => {
                let default = self.project_path(repo_root).join("capabilities.json");
                default.exists().then_some(default)
            }
        }
    }

    pub fn capability_base_path(&self, repo_root: &Path) -> Option<PathBuf> {
        self.capability_base.as_ref().map(|p| repo_root.join(p))
    }

    /// Directory names language detection and rename scans never descend into.
    pub fn ignored_dirs(&self) -> Vec<String> {
        let mut dirs: Vec<String> = [".git", "target", "node_modules"]
            .into_iter()
            .map(String::from)
            .collect();
        for p in [
            &self.artifacts_dir,
            &self.audit_dir,
            &self.project_dir,
            &self.diffs_dir,
        ] {
            if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                dirs.push(name.to_string());
            }
        }
        dirs.sort();
        dirs.dedup();
        dirs
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: PathBuf::from(CONFIG_FILE),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GatekeepConfig::load(dir.path()).unwrap();
        assert_eq!(cfg, GatekeepConfig::default());
        assert_eq!(cfg.subprocess.timeout_secs, 120);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".project")).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "default_author = \"ci\"\n[subprocess]\ntimeout_secs = 5\n",
        )
        .unwrap();

        let cfg = GatekeepConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.default_author, "ci");
        assert_eq!(cfg.subprocess.timeout_secs, 5);
        assert_eq!(cfg.artifacts_dir, PathBuf::from("artifacts"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".project")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "timeout = [").unwrap();
        assert!(matches!(
            GatekeepConfig::load(dir.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_to_toml_round_trips() {
        let cfg = GatekeepConfig::default();
        let text = cfg.to_toml().unwrap();
        let back: GatekeepConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_ignored_dirs_include_governance_dirs() {
        let dirs = GatekeepConfig::default().ignored_dirs();
        for d in [".git", "artifacts", "audit", ".project", "diffs"] {
            assert!(dirs.contains(&d.to_string()), "missing {d}");
        }
    }
}
