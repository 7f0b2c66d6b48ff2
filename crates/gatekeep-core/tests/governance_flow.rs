//! Integration tests for phase gating and the artifact lifecycle through
//! the `Project` facade, against a real on-disk layout.

use gatekeep_core::{
    ArtifactError, GatedCommand, GatekeepError, Phase, PhaseError, Project, SafetyError,
};
use gatekeep_state::{ArtifactStatus, ArtifactType, DependencyProblem};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

fn initialised() -> (TempDir, Project) {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::open(dir.path()).unwrap();
    project.init().unwrap();
    (dir, project)
}

fn approved(project: &Project, artifact_type: ArtifactType, payload: serde_json::Value) -> Uuid {
    let env = project.register(artifact_type, payload, None, vec![]).unwrap();
    project.approve(env.id(), Some("alice")).unwrap();
    env.id()
}

fn write(root: &std::path::Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

// ── Phase derivation ──

#[test]
fn fresh_directory_is_uninit_and_only_setup_commands_pass() {
    let dir = tempfile::tempdir().unwrap();
    let project = Project::open(dir.path()).unwrap();

    assert_eq!(project.phase().unwrap(), Phase::Uninit);
    project.check(GatedCommand::Init).unwrap();
    project.check(GatedCommand::Status).unwrap();
    let err = project.check(GatedCommand::PlanProject).unwrap_err();
    assert!(matches!(
        err,
        GatekeepError::Phase(PhaseError::WrongPhase {
            current: Phase::Uninit,
            required: Phase::Init,
            ..
        })
    ));
}

#[test]
fn init_is_idempotent_and_keeps_existing_config() {
    let (dir, project) = initialised();
    let config = dir.path().join(".project/config.toml");
    assert!(config.exists());
    std::fs::write(&config, "default_author = \"bob\"\n").unwrap();

    let created = project.init().unwrap();
    assert!(created.is_empty());
    assert_eq!(
        std::fs::read_to_string(&config).unwrap(),
        "default_author = \"bob\"\n"
    );
}

#[test]
fn phase_advances_with_approvals_and_lock() {
    let (dir, project) = initialised();
    assert_eq!(project.phase().unwrap(), Phase::Init);

    approved(&project, ArtifactType::ProjectPlan, json!({"name": "demo"}));
    assert_eq!(project.phase().unwrap(), Phase::Planning);

    approved(
        &project,
        ArtifactType::ScaffoldPlan,
        json!({"files": ["src/a.py"]}),
    );
    assert_eq!(project.phase().unwrap(), Phase::Scaffolded);
    assert!(project.check(GatedCommand::Impl).is_err());

    write(dir.path(), "tests/test_a.py", "def test_a():\n    pass\n");
    let tests = approved(
        &project,
        ArtifactType::TestPlan,
        json!({"test_files": ["tests/test_a.py"]}),
    );
    project.lock_tests(tests, true).unwrap();
    assert_eq!(project.phase().unwrap(), Phase::TestLocked);

    approved(
        &project,
        ArtifactType::ImplementationPlan,
        json!({"summary": "core", "files": ["src/a.py"]}),
    );
    assert_eq!(project.phase().unwrap(), Phase::Implementing);
    project.check(GatedCommand::Apply).unwrap();
}

#[test]
fn revoking_the_project_plan_drops_the_phase_back() {
    let (_dir, project) = initialised();
    let plan = approved(&project, ArtifactType::ProjectPlan, json!({"name": "demo"}));
    assert_eq!(project.phase().unwrap(), Phase::Planning);

    project.revoke(plan, true).unwrap();
    assert_eq!(project.phase().unwrap(), Phase::Init);
    assert!(project.lifecycle().approval(plan).is_none());
}

// ── Lifecycle ──

#[test]
fn approval_is_recorded_with_its_author() {
    let (_dir, project) = initialised();
    let plan = approved(&project, ArtifactType::ProjectPlan, json!({"name": "demo"}));
    let approval = project.lifecycle().approval(plan).unwrap();
    assert_eq!(approval.approved_by, "alice");
}

#[test]
fn modify_bumps_version_only_in_draft() {
    let (_dir, project) = initialised();
    let env = project
        .register(ArtifactType::ProjectPlan, json!({"name": "demo"}), None, vec![])
        .unwrap();
    let modified = project
        .modify(env.id(), &json!({"goals": ["ship"]}))
        .unwrap();
    assert_eq!(modified.version(), env.version() + 1);

    project.approve(env.id(), None).unwrap();
    let err = project.modify(env.id(), &json!({"name": "other"})).unwrap_err();
    assert!(matches!(
        err,
        GatekeepError::Artifact(ArtifactError::InvalidTransition { .. })
    ));
}

#[test]
fn locked_test_plan_is_immutable() {
    let (dir, project) = initialised();
    write(dir.path(), "tests/test_a.py", "assert True\n");
    let tests = approved(
        &project,
        ArtifactType::TestPlan,
        json!({"test_files": ["tests/test_a.py"]}),
    );
    let locked = project.lock_tests(tests, true).unwrap();
    assert_eq!(locked.status(), ArtifactStatus::Locked);

    assert!(matches!(
        project.revoke(tests, true).unwrap_err(),
        GatekeepError::Artifact(ArtifactError::Immutable { .. })
    ));
    assert!(matches!(
        project.modify(tests, &json!({"description": "x"})).unwrap_err(),
        GatekeepError::Artifact(ArtifactError::Immutable { .. })
    ));
}

#[test]
fn only_test_plans_can_be_locked() {
    let (_dir, project) = initialised();
    let plan = approved(&project, ArtifactType::ProjectPlan, json!({"name": "demo"}));
    let err = project.lock_tests(plan, true).unwrap_err();
    assert!(matches!(
        err,
        GatekeepError::Artifact(ArtifactError::InvalidTransition { .. })
    ));
    assert_eq!(
        project.lifecycle().get(plan).unwrap().status(),
        ArtifactStatus::Approved
    );
}

#[test]
fn lock_and_revoke_need_confirmation() {
    let (_dir, project) = initialised();
    let plan = approved(&project, ArtifactType::ProjectPlan, json!({"name": "demo"}));
    assert!(matches!(
        project.revoke(plan, false).unwrap_err(),
        GatekeepError::Phase(PhaseError::ConfirmationRequired { .. })
    ));
    assert!(matches!(
        project.lock_tests(plan, false).unwrap_err(),
        GatekeepError::Phase(PhaseError::ConfirmationRequired { .. })
    ));
    assert_eq!(
        project.lifecycle().get(plan).unwrap().status(),
        ArtifactStatus::Approved
    );
}

#[test]
fn missing_test_file_locks_nothing() {
    let (dir, project) = initialised();
    let tests = approved(
        &project,
        ArtifactType::TestPlan,
        json!({"test_files": ["tests/test_missing.py"]}),
    );

    let err = project.lock_tests(tests, true).unwrap_err();
    assert!(matches!(
        err,
        GatekeepError::Safety(SafetyError::MissingTestFile { .. })
    ));
    assert_eq!(
        project.lifecycle().get(tests).unwrap().status(),
        ArtifactStatus::Approved
    );
    assert!(!dir.path().join(".project/.lock").exists());
}

#[test]
fn unwritable_lock_record_leaves_plan_approved() {
    let (dir, project) = initialised();
    write(dir.path(), "tests/test_a.py", "assert True\n");
    let tests = approved(
        &project,
        ArtifactType::TestPlan,
        json!({"test_files": ["tests/test_a.py"]}),
    );
    // A directory where the lock file belongs makes the record unwritable.
    std::fs::create_dir_all(dir.path().join(".project/.lock/blocked")).unwrap();

    let err = project.lock_tests(tests, true).unwrap_err();
    assert!(matches!(err, GatekeepError::Safety(SafetyError::Io { .. })));
    assert_eq!(
        project.lifecycle().get(tests).unwrap().status(),
        ArtifactStatus::Approved
    );
    assert_eq!(project.phase().unwrap(), Phase::Init);
}

#[test]
fn draft_dependency_is_refused() {
    let (_dir, project) = initialised();
    let draft = project
        .register(ArtifactType::ProjectPlan, json!({"name": "demo"}), None, vec![])
        .unwrap();

    let err = project
        .register(
            ArtifactType::ArchitecturePlan,
            json!({"summary": "layers"}),
            None,
            vec![draft.id()],
        )
        .unwrap_err();
    match err {
        GatekeepError::Artifact(ArtifactError::Dependency {
            dependency_id,
            problem,
            ..
        }) => {
            assert_eq!(dependency_id, draft.id());
            assert_eq!(problem, DependencyProblem::Draft);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn validation_results_cannot_be_registered_by_hand() {
    let (_dir, project) = initialised();
    let err = project
        .register(
            ArtifactType::ValidationResult,
            json!({"passed": true}),
            None,
            vec![],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        GatekeepError::Artifact(ArtifactError::Validation { .. })
    ));
}

// ── Reporting ──

#[test]
fn status_and_diagnose_summarise_the_project() {
    let (dir, project) = initialised();
    write(dir.path(), "pyproject.toml", "[project]\nname = \"demo\"\n");
    approved(&project, ArtifactType::ProjectPlan, json!({"name": "demo"}));
    project
        .register(ArtifactType::ProjectPlan, json!({"name": "v2"}), None, vec![])
        .unwrap();

    let status = project.status().unwrap();
    assert_eq!(status.phase, Phase::Planning);
    assert_eq!(status.artifacts.len(), 2);
    assert!(status.lock.valid);
    assert_eq!(status.pending_diffs, 0);

    let report = project.diagnose().unwrap();
    assert_eq!(report.language, "python");
    assert_eq!(report.capabilities.len(), 4);
    let plans = &report.artifact_counts[&ArtifactType::ProjectPlan.to_string()];
    assert_eq!(plans.values().sum::<usize>(), 2);
    assert!(report.recent_executions.is_empty());

    let resume = project.resume().unwrap();
    assert!(resume.next_step.contains("plan scaffold"));
}
