//! Project phase derivation and command gating.
//!
//! The phase is never stored. Every call to [`PhaseGate::current`] derives
//! it again from the project directory and the artifact store:
//!
//! ```text
//! UNINIT       no project directory
//! INIT         project directory exists
//! PLANNING     + an approved PROJECT_PLAN
//! SCAFFOLDED   + an approved SCAFFOLD_PLAN
//! TEST_LOCKED  + a LOCKED TEST_PLAN
//! IMPLEMENTING + an approved IMPLEMENTATION_PLAN
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use gatekeep_state::{ArtifactStatus, ArtifactType, StoragePort, StorageResult};
use serde::{Deserialize, Serialize};

use crate::domain::PhaseError;
use crate::obs::emit_phase_denied;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Uninit,
    Init,
    Planning,
    Scaffolded,
    TestLocked,
    Implementing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Uninit => "UNINIT",
            Phase::Init => "INIT",
            Phase::Planning => "PLANNING",
            Phase::Scaffolded => "SCAFFOLDED",
            Phase::TestLocked => "TEST_LOCKED",
            Phase::Implementing => "IMPLEMENTING",
        };
        f.write_str(s)
    }
}

/// Every phase-gated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatedCommand {
    Init,
    Status,
    Diagnose,
    PlanProject,
    Approve,
    Revoke,
    Modify,
    Resume,
    Log,
    Review,
    Validate,
    RefactorCheck,
    PlanArchitecture,
    PlanScaffold,
    Scaffold,
    PlanTests,
    Lock,
    RefactorDryRun,
    RefactorApply,
    PlanImplementation,
    PlanRefactor,
    PlanReconciliation,
    Impl,
    Apply,
}

impl GatedCommand {
    /// The `plan <type>` command for an artifact type.
    ///
    /// VALIDATION_RESULT artifacts are only produced by `validate`.
    pub fn plan(artifact_type: ArtifactType) -> Option<Self> {
        let cmd = match artifact_type {
            ArtifactType::ProjectPlan => GatedCommand::PlanProject,
            ArtifactType::ArchitecturePlan => GatedCommand::PlanArchitecture,
            ArtifactType::ScaffoldPlan => GatedCommand::PlanScaffold,
            ArtifactType::TestPlan => GatedCommand::PlanTests,
            ArtifactType::ImplementationPlan => GatedCommand::PlanImplementation,
            ArtifactType::RefactorPlan => GatedCommand::PlanRefactor,
            ArtifactType::ReconciliationPlan => GatedCommand::PlanReconciliation,
            ArtifactType::ValidationResult => return None,
        };
        Some(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GatedCommand::Init => "init",
            GatedCommand::Status => "status",
            GatedCommand::Diagnose => "diagnose",
            GatedCommand::PlanProject => "plan project",
            GatedCommand::Approve => "approve",
            GatedCommand::Revoke => "revoke",
            GatedCommand::Modify => "modify",
            GatedCommand::Resume => "resume",
            GatedCommand::Log => "log",
            GatedCommand::Review => "review",
            GatedCommand::Validate => "validate",
            GatedCommand::RefactorCheck => "refactor check",
            GatedCommand::PlanArchitecture => "plan architecture",
            GatedCommand::PlanScaffold => "plan scaffold",
            GatedCommand::Scaffold => "scaffold",
            GatedCommand::PlanTests => "plan tests",
            GatedCommand::Lock => "lock",
            GatedCommand::RefactorDryRun => "refactor dry-run",
            GatedCommand::RefactorApply => "refactor apply",
            GatedCommand::PlanImplementation => "plan implementation",
            GatedCommand::PlanRefactor => "plan refactor",
            GatedCommand::PlanReconciliation => "plan reconciliation",
            GatedCommand::Impl => "impl",
            GatedCommand::Apply => "apply",
        }
    }

    /// Static command -> minimum phase table.
    pub fn min_phase(&self) -> Phase {
        match self {
            GatedCommand::Init | GatedCommand::Status | GatedCommand::Diagnose => Phase::Uninit,

            GatedCommand::PlanProject
            | GatedCommand::Approve
            | GatedCommand::Revoke
            | GatedCommand::Modify
            | GatedCommand::Resume
            | GatedCommand::Log
            | GatedCommand::Review
            | GatedCommand::Validate
            | GatedCommand::RefactorCheck => Phase::Init,

            GatedCommand::PlanArchitecture | GatedCommand::PlanScaffold => Phase::Planning,

            GatedCommand::Scaffold
            | GatedCommand::PlanTests
            | GatedCommand::Lock
            | GatedCommand::RefactorDryRun
            | GatedCommand::RefactorApply => Phase::Scaffolded,

            GatedCommand::PlanImplementation
            | GatedCommand::PlanRefactor
            | GatedCommand::PlanReconciliation
            | GatedCommand::Impl
            | GatedCommand::Apply => Phase::TestLocked,
        }
    }
}

impl fmt::Display for GatedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derives the phase from artifact state and gates commands on it.
#[derive(Clone)]
pub struct PhaseGate {
    project_dir: PathBuf,
    store: Arc<dyn StoragePort>,
}

impl PhaseGate {
    pub fn new(project_dir: impl Into<PathBuf>, store: Arc<dyn StoragePort>) -> Self {
        Self {
            project_dir: project_dir.into(),
            store,
        }
    }

    /// Recompute the current phase.
    pub fn current(&self) -> StorageResult<Phase> {
        if !self.project_dir.is_dir() {
            return Ok(Phase::Uninit);
        }
        if !self.store.has_approved(ArtifactType::ProjectPlan)? {
            return Ok(Phase::Init);
        }
        if !self.store.has_approved(ArtifactType::ScaffoldPlan)? {
            return Ok(Phase::Planning);
        }
        if self
            .store
            .list_by_status(ArtifactType::TestPlan, ArtifactStatus::Locked)?
            .is_empty()
        {
            return Ok(Phase::Scaffolded);
        }
        if !self.store.has_approved(ArtifactType::ImplementationPlan)? {
            return Ok(Phase::TestLocked);
        }
        Ok(Phase::Implementing)
    }

    /// Permit `command` iff the current phase is at least its minimum.
    pub fn check(&self, command: GatedCommand) -> Result<Phase, PhaseError> {
        let current = self.current().map_err(|e| PhaseError::MissingPrerequisite {
            command: command.name().to_string(),
            prerequisite: format!("a readable artifact store ({e})"),
        })?;
        let required = command.min_phase();
        if current >= required {
            Ok(current)
        } else {
            emit_phase_denied(command.name(), &current.to_string(), &required.to_string());
            Err(PhaseError::WrongPhase {
                command: command.name().to_string(),
                current,
                required,
            })
        }
    }

    /// Suggested next command for a phase.
    pub fn next_step(phase: Phase) -> &'static str {
        match phase {
            Phase::Uninit => "gatekeep init",
            Phase::Init => "gatekeep plan project --payload <file.json>, then gatekeep approve <id>",
            Phase::Planning => {
                "gatekeep plan scaffold --payload <file.json>, then gatekeep approve <id>"
            }
            Phase::Scaffolded => {
                "gatekeep scaffold <id> --apply, gatekeep plan tests --payload <file.json>, then gatekeep lock <id> --yes"
            }
            Phase::TestLocked => {
                "gatekeep plan implementation --payload <file.json>, then gatekeep approve <id>"
            }
            Phase::Implementing => {
                "gatekeep impl --target <file> --patch <file> --plan <id>, then gatekeep review approve <diff-id> and gatekeep apply <diff-id>"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeep_state::{
        ArtifactEnvelope, ArtifactPayload, EntryKind, ImplementationPlan, LifecycleAction,
        MemoryArtifactStore, ProjectPlan, ScaffoldEntry, ScaffoldPlan, TestPlan,
    };

    fn approved(payload: ArtifactPayload) -> ArtifactEnvelope {
        ArtifactEnvelope::draft(payload, "alice", [])
            .unwrap()
            .transition(LifecycleAction::Approve)
            .unwrap()
    }

    fn project() -> ArtifactPayload {
        ArtifactPayload::ProjectPlan(ProjectPlan {
            name: "demo".into(),
            goals: vec![],
            constraints: vec![],
        })
    }

    fn scaffold() -> ArtifactPayload {
        ArtifactPayload::ScaffoldPlan(ScaffoldPlan {
            language: None,
            files: vec![ScaffoldEntry::new("src/a.py", "", EntryKind::Source)],
        })
    }

    fn tests() -> ArtifactPayload {
        ArtifactPayload::TestPlan(TestPlan {
            description: String::new(),
            test_files: vec!["tests/test_a.py".into()],
        })
    }

    fn gate() -> (tempfile::TempDir, Arc<MemoryArtifactStore>, PhaseGate) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        let gate = PhaseGate::new(dir.path().join(".project"), store.clone());
        (dir, store, gate)
    }

    #[test]
    fn test_phase_progression() {
        let (dir, store, gate) = gate();
        assert_eq!(gate.current().unwrap(), Phase::Uninit);

        std::fs::create_dir_all(dir.path().join(".project")).unwrap();
        assert_eq!(gate.current().unwrap(), Phase::Init);

        store.save(&approved(project())).unwrap();
        assert_eq!(gate.current().unwrap(), Phase::Planning);

        store.save(&approved(scaffold())).unwrap();
        assert_eq!(gate.current().unwrap(), Phase::Scaffolded);

        let locked = approved(tests()).transition(LifecycleAction::Lock).unwrap();
        store.save(&locked).unwrap();
        assert_eq!(gate.current().unwrap(), Phase::TestLocked);

        store
            .save(&approved(ArtifactPayload::ImplementationPlan(
                ImplementationPlan {
                    summary: "do it".into(),
                    files: vec!["src/a.py".into()],
                },
            )))
            .unwrap();
        assert_eq!(gate.current().unwrap(), Phase::Implementing);
    }

    #[test]
    fn test_phase_is_rederived_after_revoke() {
        let (dir, store, gate) = gate();
        std::fs::create_dir_all(dir.path().join(".project")).unwrap();
        let plan = approved(project());
        store.save(&plan).unwrap();
        assert_eq!(gate.current().unwrap(), Phase::Planning);

        store
            .save(&plan.transition(LifecycleAction::Revoke).unwrap())
            .unwrap();
        assert_eq!(gate.current().unwrap(), Phase::Init);
    }

    #[test]
    fn test_check_denies_early_commands() {
        let (dir, _store, gate) = gate();
        assert!(gate.check(GatedCommand::Init).is_ok());
        assert!(gate.check(GatedCommand::Diagnose).is_ok());

        let err = gate.check(GatedCommand::PlanProject).unwrap_err();
        assert!(matches!(
            err,
            PhaseError::WrongPhase {
                current: Phase::Uninit,
                required: Phase::Init,
                ..
            }
        ));

        std::fs::create_dir_all(dir.path().join(".project")).unwrap();
        assert!(gate.check(GatedCommand::PlanProject).is_ok());
        assert!(gate.check(GatedCommand::Impl).is_err());
        assert!(gate.check(GatedCommand::Scaffold).is_err());
    }

    #[test]
    fn test_plan_command_mapping() {
        assert_eq!(
            GatedCommand::plan(ArtifactType::TestPlan).unwrap().min_phase(),
            Phase::Scaffolded
        );
        assert_eq!(
            GatedCommand::plan(ArtifactType::ImplementationPlan)
                .unwrap()
                .min_phase(),
            Phase::TestLocked
        );
        assert!(GatedCommand::plan(ArtifactType::ValidationResult).is_none());
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Uninit < Phase::Init);
        assert!(Phase::TestLocked < Phase::Implementing);
        assert_eq!(Phase::TestLocked.to_string(), "TEST_LOCKED");
    }
}
