//! `gatekeep validate`: run the test suite and record a VALIDATION_RESULT.

use std::path::Path;

use gatekeep_state::{ArtifactEnvelope, ArtifactPayload, ValidationResult};
use tracing::Instrument;

use crate::domain::{GatekeepError, PhaseError};
use crate::language::detect_language;
use crate::lifecycle::ArtifactLifecycle;
use crate::obs::execution_span;
use crate::runner::run_command;
use crate::safety::SafetyEnforcer;

/// Bytes of combined output kept in the recorded result.
pub const OUTPUT_TAIL_BYTES: usize = 4096;

/// Test command for a detected language.
pub fn default_test_command(language: &str) -> Option<Vec<String>> {
    let argv: &[&str] = match language {
        "python" => &["python", "-m", "pytest"],
        "rust" => &["cargo", "test"],
        "go" => &["go", "test", "./..."],
        "javascript" | "typescript" => &["npm", "test"],
        "java" => &["mvn", "-q", "test"],
        _ => return None,
    };
    Some(argv.iter().map(|s| s.to_string()).collect())
}

/// Last `max` bytes of `text`, cut on a char boundary.
pub fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

pub struct Validator {
    lifecycle: ArtifactLifecycle,
    safety: SafetyEnforcer,
    test_command: Vec<String>,
    timeout_secs: u64,
    ignored_dirs: Vec<String>,
}

impl Validator {
    pub fn new(
        lifecycle: ArtifactLifecycle,
        safety: SafetyEnforcer,
        test_command: Vec<String>,
        timeout_secs: u64,
        ignored_dirs: Vec<String>,
    ) -> Self {
        Self {
            lifecycle,
            safety,
            test_command,
            timeout_secs,
            ignored_dirs,
        }
    }

    fn command(&self, repo_root: &Path) -> Result<Vec<String>, PhaseError> {
        if !self.test_command.is_empty() {
            return Ok(self.test_command.clone());
        }
        let language = detect_language(repo_root, &self.ignored_dirs);
        default_test_command(&language).ok_or_else(|| PhaseError::MissingPrerequisite {
            command: "validate".to_string(),
            prerequisite: format!(
                "a test_command in .project/config.toml (no default for language `{language}`)"
            ),
        })
    }

    /// Verify the lock, run the tests, and register the outcome as a DRAFT
    /// VALIDATION_RESULT.
    ///
    /// A failing test run is a recorded result, not an error. Timeouts and
    /// missing test binaries are errors.
    pub async fn run(
        &self,
        repo_root: &Path,
        created_by: &str,
    ) -> Result<ArtifactEnvelope, GatekeepError> {
        let span = execution_span("validate", &repo_root.display().to_string());
        async move {
            let lock = self.safety.verify_lock(repo_root);
            if !lock.valid {
                tracing::warn!(modified = ?lock.modified, "locked test files were modified");
            }

            let command = self.command(repo_root)?;
            let output = run_command(&command, repo_root, self.timeout_secs).await?;
            let combined = output.combined();

            let result = ValidationResult {
                passed: output.success && lock.valid,
                exit_code: output.exit_code,
                command,
                output_tail: tail(&combined, OUTPUT_TAIL_BYTES).to_string(),
                lock_valid: lock.valid,
                modified_files: lock.modified,
            };
            tracing::info!(
                passed = result.passed,
                exit_code = ?result.exit_code,
                lock_valid = result.lock_valid,
                "validation finished"
            );
            let envelope = self.lifecycle.register(
                ArtifactPayload::ValidationResult(result),
                created_by,
                [],
            )?;
            Ok::<_, GatekeepError>(envelope)
        }
        .instrument(span)
        .await
    }
}
