//! The stage driver shared by every executor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::Instrument;

use super::{ExecutionMode, ExecutionResult, Executor};
use crate::audit::{AuditLog, AuditLogEntry, Outcome};
use crate::capability::CapabilityRegistry;
use crate::domain::ExecutorError;
use crate::language::detect_language;
use crate::obs::{
    emit_execution_finished, emit_execution_started, emit_stage_failed, execution_span,
};

/// What an executor contributes to each pipeline stage.
///
/// Implementations do not decide the order or skip stages; [`Pipeline`]
/// calls them in sequence and stops at the first error.
#[async_trait]
pub trait PipelineStages: Send + Sync {
    /// The loaded artifact or diff.
    type Subject: Send + Sync;
    /// The fully checked change, ready to render and apply.
    type Change: Send + Sync;

    fn name(&self) -> &'static str;

    /// Stage 1.
    fn load(&self, reference: &str, repo_root: &Path) -> Result<Self::Subject, ExecutorError>;

    /// Stage 2.
    fn validate_schema(&self, subject: &Self::Subject) -> Result<(), ExecutorError>;

    /// Stage 3.
    fn verify_state(&self, subject: &Self::Subject) -> Result<(), ExecutorError>;

    /// Stage 4: operations that must be supported for the target language.
    fn operations(&self, subject: &Self::Subject) -> Vec<&'static str>;

    /// Language named by the subject itself; detected from the repository when `None`.
    fn declared_language(&self, _subject: &Self::Subject) -> Option<String> {
        None
    }

    /// Stage 5. Reads the repository but never writes to it.
    async fn preconditions(
        &self,
        subject: &Self::Subject,
        repo_root: &Path,
        language: &str,
    ) -> Result<Self::Change, ExecutorError>;

    /// Stage 6. Must be deterministic for the same subject and repository.
    fn render_diff(&self, change: &Self::Change) -> String;

    /// Stage 7 in APPLY mode.
    async fn apply(
        &self,
        subject: &Self::Subject,
        change: &Self::Change,
        repo_root: &Path,
    ) -> Result<Vec<String>, ExecutorError>;

    /// Stage 7 in DRY_RUN mode: what `apply` would do.
    fn preview(&self, change: &Self::Change) -> Vec<String>;

    fn files_affected(&self, change: &Self::Change) -> Vec<String>;
}

#[derive(Default)]
struct Progress {
    logs: Vec<String>,
    diff_paths: Vec<PathBuf>,
    files_affected: Vec<String>,
}

/// Runs one [`PipelineStages`] implementation through the fixed stage order.
pub struct Pipeline<S> {
    stages: S,
    capabilities: Arc<CapabilityRegistry>,
    audit: Arc<AuditLog>,
    ignored_dirs: Vec<String>,
}

impl<S: PipelineStages> Pipeline<S> {
    pub fn new(
        stages: S,
        capabilities: Arc<CapabilityRegistry>,
        audit: Arc<AuditLog>,
        ignored_dirs: Vec<String>,
    ) -> Self {
        Self {
            stages,
            capabilities,
            audit,
            ignored_dirs,
        }
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    async fn checked(
        &self,
        reference: &str,
        repo_root: &Path,
        progress: &mut Progress,
    ) -> Result<(S::Subject, S::Change), (u8, ExecutorError)> {
        let subject = self.stages.load(reference, repo_root).map_err(|e| (1, e))?;
        self.stages.validate_schema(&subject).map_err(|e| (2, e))?;
        self.stages.verify_state(&subject).map_err(|e| (3, e))?;

        let language = self
            .stages
            .declared_language(&subject)
            .unwrap_or_else(|| detect_language(repo_root, &self.ignored_dirs));
        for operation in self.stages.operations(&subject) {
            if !self.capabilities.check_capability(operation, &language) {
                return Err((
                    4,
                    ExecutorError::CapabilityUnsupported {
                        operation: operation.to_string(),
                        language: language.clone(),
                    },
                ));
            }
        }
        progress.logs.push(format!("Target language: {language}"));

        let change = self
            .stages
            .preconditions(&subject, repo_root, &language)
            .await
            .map_err(|e| (5, e))?;
        progress.files_affected = self.stages.files_affected(&change);
        Ok((subject, change))
    }

    async fn run(
        &self,
        reference: &str,
        repo_root: &Path,
        mode: ExecutionMode,
        progress: &mut Progress,
    ) -> Result<(), (u8, ExecutorError)> {
        let (subject, change) = self.checked(reference, repo_root, progress).await?;

        let diff = self.stages.render_diff(&change);
        let archived = self
            .audit
            .archive_diff(self.stages.name(), &diff)
            .map_err(|e| {
                (
                    6,
                    ExecutorError::Audit {
                        message: e.to_string(),
                    },
                )
            })?;
        progress
            .logs
            .push(format!("Diff archived at {}", archived.display()));
        progress.diff_paths.push(archived);

        match mode {
            ExecutionMode::Apply => {
                let logs = self
                    .stages
                    .apply(&subject, &change, repo_root)
                    .await
                    .map_err(|e| (7, e))?;
                progress.logs.extend(logs);
            }
            ExecutionMode::DryRun => progress.logs.extend(self.stages.preview(&change)),
        }
        Ok(())
    }

    /// Stages 1 to 5 only: no diff is archived, nothing is audited.
    ///
    /// Returns the files the change would touch.
    pub async fn check(&self, reference: &str, repo_root: &Path) -> Result<Vec<String>, ExecutorError> {
        let mut progress = Progress::default();
        self.checked(reference, repo_root, &mut progress)
            .await
            .map_err(|(_, e)| e)?;
        Ok(progress.files_affected)
    }
}

#[async_trait]
impl<S: PipelineStages> Executor for Pipeline<S> {
    fn name(&self) -> &'static str {
        self.stages.name()
    }

    async fn execute(
        &self,
        reference: &str,
        repo_root: &Path,
        mode: ExecutionMode,
    ) -> ExecutionResult {
        let name = self.stages.name();
        let span = execution_span(name, reference);
        async move {
            let start = Instant::now();
            emit_execution_started(name, reference, &mode.to_string());

            let mut progress = Progress::default();
            let mut error = match self.run(reference, repo_root, mode, &mut progress).await {
                Ok(()) => None,
                Err((stage, e)) => {
                    emit_stage_failed(name, stage, &e);
                    progress.logs.push(format!("Stage {stage} failed: {e}"));
                    Some(e)
                }
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let entry = AuditLogEntry {
                executor: name.to_string(),
                artifact_ref: reference.to_string(),
                mode,
                outcome: if error.is_none() {
                    Outcome::Success
                } else {
                    Outcome::Failure
                },
                diff_path: progress
                    .diff_paths
                    .first()
                    .map(|p| p.display().to_string()),
                files_affected: progress.files_affected.clone(),
                duration_ms,
                timestamp: Utc::now(),
                error: error.as_ref().map(|e| e.to_string()),
                error_kind: error.as_ref().map(|e| e.kind().to_string()),
            };
            if let Err(e) = self.audit.append(&entry) {
                tracing::error!(executor = %name, error = %e, "audit append failed");
                if error.is_none() {
                    error = Some(ExecutorError::Audit {
                        message: e.to_string(),
                    });
                }
            }

            let success = error.is_none();
            emit_execution_finished(name, reference, duration_ms, success);
            ExecutionResult {
                executor: name.to_string(),
                reference: reference.to_string(),
                mode,
                success,
                logs: progress.logs,
                diff_paths: progress.diff_paths,
                files_affected: progress.files_affected,
                error,
                duration_ms,
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::capability::OP_SCAFFOLD;

    /// Stages with a switchable failure point and an apply flag.
    struct Scripted {
        fail_at: Option<u8>,
        applied: AtomicBool,
    }

    impl Scripted {
        fn failing_at(stage: Option<u8>) -> Self {
            Self {
                fail_at: stage,
                applied: AtomicBool::new(false),
            }
        }

        fn gate(&self, stage: u8) -> Result<(), ExecutorError> {
            if self.fail_at == Some(stage) {
                Err(ExecutorError::SourceMissing {
                    path: format!("stage-{stage}"),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PipelineStages for Scripted {
        type Subject = ();
        type Change = ();

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn load(&self, _reference: &str, _repo_root: &Path) -> Result<(), ExecutorError> {
            self.gate(1)
        }

        fn validate_schema(&self, _subject: &()) -> Result<(), ExecutorError> {
            self.gate(2)
        }

        fn verify_state(&self, _subject: &()) -> Result<(), ExecutorError> {
            self.gate(3)
        }

        fn operations(&self, _subject: &()) -> Vec<&'static str> {
            vec![OP_SCAFFOLD]
        }

        fn declared_language(&self, _subject: &()) -> Option<String> {
            Some("python".to_string())
        }

        async fn preconditions(
            &self,
            _subject: &(),
            _repo_root: &Path,
            _language: &str,
        ) -> Result<(), ExecutorError> {
            self.gate(5)
        }

        fn render_diff(&self, _change: &()) -> String {
            "--- /dev/null\n+++ b/x\n@@ -0,0 +1 @@\n+x\n".to_string()
        }

        async fn apply(
            &self,
            _subject: &(),
            _change: &(),
            _repo_root: &Path,
        ) -> Result<Vec<String>, ExecutorError> {
            self.applied.store(true, Ordering::SeqCst);
            self.gate(7)?;
            Ok(vec!["Created x".to_string()])
        }

        fn preview(&self, _change: &()) -> Vec<String> {
            vec!["Would create x".to_string()]
        }

        fn files_affected(&self, _change: &()) -> Vec<String> {
            vec!["x".to_string()]
        }
    }

    fn pipeline(dir: &Path, stages: Scripted) -> Pipeline<Scripted> {
        Pipeline::new(
            stages,
            Arc::new(CapabilityRegistry::builtin()),
            Arc::new(AuditLog::new(dir.join("audit"))),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_every_outcome_writes_exactly_one_audit_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut expected = 0;
        for fail_at in [None, Some(1), Some(2), Some(3), Some(5), Some(7)] {
            let p = pipeline(dir.path(), Scripted::failing_at(fail_at));
            let result = p.execute("ref", dir.path(), ExecutionMode::Apply).await;
            expected += 1;
            assert_eq!(result.success, fail_at.is_none());
            assert_eq!(AuditLog::new(dir.path().join("audit")).all().unwrap().len(), expected);
        }
    }

    #[tokio::test]
    async fn test_failure_before_stage_six_archives_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), Scripted::failing_at(Some(5)));
        let result = p.execute("ref", dir.path(), ExecutionMode::Apply).await;
        assert!(result.diff_paths.is_empty());
        assert!(!p.stages().applied.load(Ordering::SeqCst));
        assert_eq!(
            result.error,
            Some(ExecutorError::SourceMissing {
                path: "stage-5".into()
            })
        );
    }

    #[tokio::test]
    async fn test_diff_archived_even_when_apply_fails() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), Scripted::failing_at(Some(7)));
        let result = p.execute("ref", dir.path(), ExecutionMode::Apply).await;
        assert!(!result.success);
        assert_eq!(result.diff_paths.len(), 1);
        assert!(result.diff_paths[0].exists());
    }

    #[tokio::test]
    async fn test_dry_run_never_applies() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), Scripted::failing_at(None));
        let result = p.execute("ref", dir.path(), ExecutionMode::DryRun).await;
        assert!(result.success);
        assert!(!p.stages().applied.load(Ordering::SeqCst));
        assert!(result.logs.iter().any(|l| l.starts_with("Would")));

        let entries = AuditLog::new(dir.path().join("audit")).all().unwrap();
        assert_eq!(entries[0].mode, ExecutionMode::DryRun);
        assert_eq!(entries[0].outcome, Outcome::Success);
        assert!(entries[0].diff_path.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_at_capability_stage() {
        struct Unknown(Scripted);

        #[async_trait]
        impl PipelineStages for Unknown {
            type Subject = ();
            type Change = ();
            fn name(&self) -> &'static str {
                "unknown"
            }
            fn load(&self, r: &str, root: &Path) -> Result<(), ExecutorError> {
                self.0.load(r, root)
            }
            fn validate_schema(&self, s: &()) -> Result<(), ExecutorError> {
                self.0.validate_schema(s)
            }
            fn verify_state(&self, s: &()) -> Result<(), ExecutorError> {
                self.0.verify_state(s)
            }
            fn operations(&self, s: &()) -> Vec<&'static str> {
                self.0.operations(s)
            }
            fn declared_language(&self, _s: &()) -> Option<String> {
                Some("cobol".to_string())
            }
            async fn preconditions(
                &self,
                _s: &(),
                _root: &Path,
                _language: &str,
            ) -> Result<(), ExecutorError> {
                panic!("preconditions must not run after a capability failure");
            }
            fn render_diff(&self, c: &()) -> String {
                self.0.render_diff(c)
            }
            async fn apply(
                &self,
                s: &(),
                c: &(),
                root: &Path,
            ) -> Result<Vec<String>, ExecutorError> {
                self.0.apply(s, c, root).await
            }
            fn preview(&self, c: &()) -> Vec<String> {
                self.0.preview(c)
            }
            fn files_affected(&self, c: &()) -> Vec<String> {
                self.0.files_affected(c)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let p = Pipeline::new(
            Unknown(Scripted::failing_at(None)),
            Arc::new(CapabilityRegistry::builtin()),
            Arc::new(AuditLog::new(dir.path().join("audit"))),
            Vec::new(),
        );
        let result = p.execute("ref", dir.path(), ExecutionMode::Apply).await;
        assert!(matches!(
            result.error,
            Some(ExecutorError::CapabilityUnsupported { .. })
        ));
        let entries = AuditLog::new(dir.path().join("audit")).all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].error_kind.as_deref(), Some("capability"));
    }
}
