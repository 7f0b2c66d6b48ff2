//! One governed repository: configuration plus every service wired together.
//!
//! `Project::open` loads configuration, the capability registry and test
//! patterns once and hands them to each service by value or `Arc`. Nothing
//! here is cached between commands; the phase is re-derived on every check.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gatekeep_state::{
    next_status, ArtifactEnvelope, ArtifactPayload, ArtifactType, FsArtifactStore,
    LifecycleAction, RegistryEntry, StoragePort,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::approvals::ApprovalTracker;
use crate::audit::{AuditLog, AuditLogEntry};
use crate::capability::{CapabilityRegistry, CapabilityStatus, OPERATIONS};
use crate::config::{GatekeepConfig, CONFIG_FILE};
use crate::diff_lifecycle::{Diff, DiffLifecycle, DiffStatus};
use crate::domain::{ArtifactError, ExecutorError, PhaseError, Result};
use crate::executor::{
    DiffStages, ExecutionMode, ExecutionResult, Executor, Pipeline, PipelineStages,
    RefactorStages, ScaffoldStages,
};
use crate::language::detect_language;
use crate::lifecycle::ArtifactLifecycle;
use crate::phase::{GatedCommand, Phase, PhaseGate};
use crate::safety::{LockReport, LockStore, SafetyEnforcer, TestPatterns};
use crate::validation::Validator;

/// Number of audit entries shown by `diagnose`.
const DIAGNOSE_RECENT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub phase: Phase,
    pub next_step: String,
    pub artifacts: Vec<RegistryEntry>,
    pub lock: LockReport,
    pub pending_diffs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub language: String,
    pub capabilities: BTreeMap<String, CapabilityStatus>,
    pub phase: Phase,
    pub lock: LockReport,
    /// type -> status -> count
    pub artifact_counts: BTreeMap<String, BTreeMap<String, usize>>,
    pub pending_diffs: usize,
    pub recent_executions: Vec<AuditLogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeReport {
    pub phase: Phase,
    pub next_step: String,
}

pub struct Project {
    root: PathBuf,
    config: GatekeepConfig,
    fs_store: Arc<FsArtifactStore>,
    store: Arc<dyn StoragePort>,
    lifecycle: ArtifactLifecycle,
    capabilities: Arc<CapabilityRegistry>,
    audit: Arc<AuditLog>,
    diffs: DiffLifecycle,
    gate: PhaseGate,
    safety: SafetyEnforcer,
}

impl Project {
    /// Load configuration and wire services for the repository at `repo_root`.
    ///
    /// Nothing is created on disk; see [`Project::init`].
    pub fn open(repo_root: impl AsRef<Path>) -> Result<Self> {
        let root = repo_root.as_ref();
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let config = GatekeepConfig::load(&root)?;

        let fs_store = Arc::new(FsArtifactStore::new(config.artifacts_path(&root)));
        let store: Arc<dyn StoragePort> = fs_store.clone();
        let lifecycle = ArtifactLifecycle::new(
            store.clone(),
            ApprovalTracker::new(fs_store.meta_dir()),
        );
        let capabilities = Arc::new(CapabilityRegistry::load(
            config.capability_base_path(&root).as_deref(),
            config.capability_override_path(&root).as_deref(),
        )?);
        let safety = SafetyEnforcer::new(
            LockStore::new(config.project_path(&root)),
            TestPatterns::new(&config.test_patterns)?,
        );

        Ok(Self {
            audit: Arc::new(AuditLog::new(config.audit_path(&root))),
            diffs: DiffLifecycle::new(config.diffs_path(&root)),
            gate: PhaseGate::new(config.project_path(&root), store.clone()),
            root,
            config,
            fs_store,
            store,
            lifecycle,
            capabilities,
            safety,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &GatekeepConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StoragePort> {
        &self.store
    }

    pub fn lifecycle(&self) -> &ArtifactLifecycle {
        &self.lifecycle
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn diffs(&self) -> &DiffLifecycle {
        &self.diffs
    }

    pub fn safety(&self) -> &SafetyEnforcer {
        &self.safety
    }

    /// Gate `command` on the current phase.
    pub fn check(&self, command: GatedCommand) -> Result<Phase> {
        Ok(self.gate.check(command)?)
    }

    pub fn phase(&self) -> Result<Phase> {
        Ok(self.gate.current()?)
    }

    fn author<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit.unwrap_or(self.config.default_author.as_str())
    }

    // -----------------------------------------------------------------------
    // Setup and reporting
    // -----------------------------------------------------------------------

    /// Create the governance directories and a default config file.
    ///
    /// Idempotent; an existing config file is left alone. Returns the paths
    /// that did not exist before.
    pub fn init(&self) -> Result<Vec<PathBuf>> {
        let dirs = [
            self.config.project_path(&self.root),
            self.fs_store.meta_dir(),
            self.config.audit_path(&self.root),
            self.config.diffs_path(&self.root),
        ];
        let mut created = Vec::new();
        for dir in dirs {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                created.push(dir);
            }
        }
        self.fs_store.init()?;

        let config_path = self.root.join(CONFIG_FILE);
        if !config_path.exists() {
            let text = self.config.to_toml()?;
            gatekeep_state::write_atomic(&config_path, text.as_bytes())?;
            created.push(config_path);
        }
        tracing::info!(root = %self.root.display(), created = created.len(), "project initialised");
        Ok(created)
    }

    pub fn status(&self) -> Result<StatusReport> {
        let phase = self.phase()?;
        Ok(StatusReport {
            phase,
            next_step: PhaseGate::next_step(phase).to_string(),
            artifacts: self.store.list_all()?,
            lock: self.safety.verify_lock(&self.root),
            pending_diffs: self.diffs.list(Some(DiffStatus::Pending))?.len(),
        })
    }

    pub fn resume(&self) -> Result<ResumeReport> {
        let phase = self.phase()?;
        Ok(ResumeReport {
            phase,
            next_step: PhaseGate::next_step(phase).to_string(),
        })
    }

    pub fn diagnose(&self) -> Result<DiagnosticReport> {
        let language = detect_language(&self.root, &self.config.ignored_dirs());
        let mut capabilities = self.capabilities.operations_for(&language);
        for op in OPERATIONS {
            capabilities
                .entry(op.to_string())
                .or_insert_with(|| self.capabilities.get_capability_status(op, &language));
        }

        let mut artifact_counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for entry in self.store.list_all()? {
            *artifact_counts
                .entry(entry.artifact_type.to_string())
                .or_default()
                .entry(entry.status.to_string())
                .or_default() += 1;
        }

        Ok(DiagnosticReport {
            language,
            capabilities,
            phase: self.phase()?,
            lock: self.safety.verify_lock(&self.root),
            artifact_counts,
            pending_diffs: self.diffs.list(Some(DiffStatus::Pending))?.len(),
            recent_executions: self.audit.recent(DIAGNOSE_RECENT)?,
        })
    }

    /// Audit history: newest `limit` entries, or every entry for one reference.
    pub fn log(&self, limit: usize, artifact: Option<&str>) -> Result<Vec<AuditLogEntry>> {
        Ok(match artifact {
            Some(reference) => self.audit.for_artifact(reference)?,
            None => self.audit.recent(limit)?,
        })
    }

    // -----------------------------------------------------------------------
    // Artifact lifecycle
    // -----------------------------------------------------------------------

    /// Register a DRAFT artifact from raw payload JSON.
    ///
    /// VALIDATION_RESULT artifacts only come from [`Project::validate`].
    pub fn register(
        &self,
        artifact_type: ArtifactType,
        payload: Value,
        author: Option<&str>,
        depends_on: Vec<Uuid>,
    ) -> Result<ArtifactEnvelope> {
        if artifact_type == ArtifactType::ValidationResult {
            return Err(ArtifactError::Validation {
                reason: "VALIDATION_RESULT artifacts are recorded by `gatekeep validate`"
                    .to_string(),
            }
            .into());
        }
        Ok(self
            .lifecycle
            .register_raw(artifact_type, payload, self.author(author), depends_on)?)
    }

    pub fn approve(&self, id: Uuid, by: Option<&str>) -> Result<ArtifactEnvelope> {
        Ok(self.lifecycle.approve(id, self.author(by))?)
    }

    pub fn modify(&self, id: Uuid, updates: &Value) -> Result<ArtifactEnvelope> {
        Ok(self.lifecycle.modify(id, updates)?)
    }

    pub fn revoke(&self, id: Uuid, confirmed: bool) -> Result<ArtifactEnvelope> {
        if !confirmed {
            return Err(PhaseError::ConfirmationRequired {
                action: format!("revoke {id}"),
            }
            .into());
        }
        Ok(self.lifecycle.revoke(id)?)
    }

    /// Lock an APPROVED TEST_PLAN and snapshot its test files.
    ///
    /// Every listed test file must exist; if one is missing nothing is locked.
    /// The snapshot is written before the plan turns LOCKED, so a LOCKED plan
    /// always has one.
    pub fn lock_tests(&self, id: Uuid, confirmed: bool) -> Result<ArtifactEnvelope> {
        if !confirmed {
            return Err(PhaseError::ConfirmationRequired {
                action: format!("lock {id}"),
            }
            .into());
        }

        let plan = self.lifecycle.get(id)?;
        next_status(plan.artifact_type(), plan.status(), LifecycleAction::Lock)
            .map_err(|e| ArtifactError::transition(id, e))?;
        let ArtifactPayload::TestPlan(test_plan) = plan.payload() else {
            return Err(ArtifactError::Validation {
                reason: format!("{id} is not a TEST_PLAN"),
            }
            .into());
        };

        let lock_store = self.safety.lock_store();
        let record = lock_store.snapshot(id, &test_plan.test_files, &self.root)?;
        let previous = lock_store.read();
        lock_store.write(&record)?;
        let locked = match self.lifecycle.lock(id) {
            Ok(locked) => locked,
            Err(e) => {
                if let Err(restore) = lock_store.restore(previous.as_ref()) {
                    tracing::warn!(test_plan = %id, error = %restore, "failed to roll back lock record");
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            test_plan = %id,
            files = record.files.len(),
            "test plan locked"
        );
        Ok(locked)
    }

    // -----------------------------------------------------------------------
    // Diff proposals
    // -----------------------------------------------------------------------

    /// Record a PENDING diff, optionally under an APPROVED IMPLEMENTATION_PLAN.
    pub fn propose_diff(&self, target: &str, content: &str, plan_id: Option<Uuid>) -> Result<Diff> {
        if let Some(plan_id) = plan_id {
            let plan = self
                .store
                .load_by_id(plan_id, Some(ArtifactType::ImplementationPlan))
                .map_err(ArtifactError::from)?;
            if !plan.status().is_approved() {
                return Err(PhaseError::MissingPrerequisite {
                    command: GatedCommand::Impl.name().to_string(),
                    prerequisite: format!("IMPLEMENTATION_PLAN {plan_id} to be APPROVED"),
                }
                .into());
            }
        }
        Ok(self.diffs.propose(target, content, plan_id)?)
    }

    pub fn review_list(&self, status: Option<DiffStatus>) -> Result<Vec<Diff>> {
        Ok(self.diffs.list(status)?)
    }

    pub fn review_approve(&self, id: Uuid) -> Result<Diff> {
        Ok(self.diffs.approve(id)?)
    }

    pub fn review_reject(&self, id: Uuid) -> Result<Diff> {
        Ok(self.diffs.reject(id)?)
    }

    // -----------------------------------------------------------------------
    // Executors
    // -----------------------------------------------------------------------

    fn pipeline<S>(&self, stages: S) -> Pipeline<S>
    where
        S: PipelineStages,
    {
        Pipeline::new(
            stages,
            self.capabilities.clone(),
            self.audit.clone(),
            self.config.ignored_dirs(),
        )
    }

    pub fn scaffold_executor(&self) -> Pipeline<ScaffoldStages> {
        self.pipeline(ScaffoldStages::new(self.store.clone()))
    }

    pub fn diff_executor(&self) -> Pipeline<DiffStages> {
        self.pipeline(DiffStages::new(
            self.diffs.clone(),
            self.store.clone(),
            self.safety.clone(),
            self.config.subprocess.timeout_secs,
        ))
    }

    pub fn refactor_executor(&self) -> Pipeline<RefactorStages> {
        self.pipeline(RefactorStages::new(
            self.store.clone(),
            self.config.ignored_dirs(),
        ))
    }

    pub async fn scaffold(&self, reference: &str, mode: ExecutionMode) -> ExecutionResult {
        self.scaffold_executor()
            .execute(reference, &self.root, mode)
            .await
    }

    pub async fn apply_diff(&self, reference: &str, mode: ExecutionMode) -> ExecutionResult {
        self.diff_executor().execute(reference, &self.root, mode).await
    }

    pub async fn refactor(&self, reference: &str, mode: ExecutionMode) -> ExecutionResult {
        self.refactor_executor()
            .execute(reference, &self.root, mode)
            .await
    }

    /// Check a refactor plan without archiving a diff or writing the audit log.
    pub async fn refactor_check(
        &self,
        reference: &str,
    ) -> std::result::Result<Vec<String>, ExecutorError> {
        self.refactor_executor().check(reference, &self.root).await
    }

    /// Run the test suite and record a DRAFT VALIDATION_RESULT.
    pub async fn validate(&self, author: Option<&str>) -> Result<ArtifactEnvelope> {
        let validator = Validator::new(
            self.lifecycle.clone(),
            self.safety.clone(),
            self.config.test_command.clone(),
            self.config.subprocess.timeout_secs,
            self.config.ignored_dirs(),
        );
        validator.run(&self.root, self.author(author)).await
    }
}
