//! Trait contract tests for StoragePort.
//!
//! Every check runs against both the filesystem store and the in-memory
//! fake. Any conforming backend must pass these.

use gatekeep_state::{
    ArtifactEnvelope, ArtifactPayload, ArtifactStatus, ArtifactType, DependencyProblem,
    FsArtifactStore, ImplementationPlan, LifecycleAction, MemoryArtifactStore, ProjectPlan,
    StorageError, StoragePort, TestPlan,
};
use serde_json::json;
use uuid::Uuid;

fn project_plan() -> ArtifactEnvelope {
    ArtifactEnvelope::draft(
        ArtifactPayload::ProjectPlan(ProjectPlan {
            name: "demo".into(),
            goals: vec!["ship it".into()],
            constraints: vec![],
        }),
        "alice",
        [],
    )
    .unwrap()
}

fn test_plan(depends_on: &[Uuid]) -> ArtifactEnvelope {
    ArtifactEnvelope::draft(
        ArtifactPayload::TestPlan(TestPlan {
            description: "core tests".into(),
            test_files: vec!["tests/test_core.py".into()],
        }),
        "alice",
        depends_on.iter().copied(),
    )
    .unwrap()
}

fn impl_plan(depends_on: &[Uuid]) -> ArtifactEnvelope {
    ArtifactEnvelope::draft(
        ArtifactPayload::ImplementationPlan(ImplementationPlan {
            summary: "implement core".into(),
            files: vec!["src/core.py".into()],
        }),
        "alice",
        depends_on.iter().copied(),
    )
    .unwrap()
}

fn with_backends(check: impl Fn(&dyn StoragePort)) {
    let dir = tempfile::tempdir().unwrap();
    let fs = FsArtifactStore::new(dir.path().join("artifacts"));
    check(&fs);

    let mem = MemoryArtifactStore::new();
    check(&mem);
}

// ===========================================================================
// Round trip
// ===========================================================================

#[test]
fn save_then_load_by_id_round_trips() {
    with_backends(|store| {
        let env = project_plan();
        store.save(&env).unwrap();
        assert_eq!(store.load_by_id(env.id(), None).unwrap(), env);
        assert_eq!(
            store
                .load_by_id(env.id(), Some(ArtifactType::ProjectPlan))
                .unwrap(),
            env
        );
    });
}

#[test]
fn save_returns_loadable_path() {
    with_backends(|store| {
        let env = project_plan();
        let path = store.save(&env).unwrap();
        assert_eq!(store.load(&path).unwrap(), env);
        assert_eq!(
            path,
            store.get_path_for_artifact(env.id(), ArtifactType::ProjectPlan)
        );
    });
}

#[test]
fn load_missing_is_not_found() {
    with_backends(|store| {
        let err = store.load_by_id(Uuid::new_v4(), None).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert!(!store.exists(Uuid::new_v4()).unwrap());
    });
}

#[test]
fn load_with_wrong_type_is_not_found() {
    with_backends(|store| {
        let env = project_plan();
        store.save(&env).unwrap();
        let err = store
            .load_by_id(env.id(), Some(ArtifactType::TestPlan))
            .unwrap_err();
        assert!(err.is_not_found());
    });
}

// ===========================================================================
// Listing
// ===========================================================================

#[test]
fn list_by_type_and_status() {
    with_backends(|store| {
        let a = project_plan();
        let b = project_plan().transition(LifecycleAction::Approve).unwrap();
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        assert_eq!(store.list_by_type(ArtifactType::ProjectPlan).unwrap().len(), 2);
        assert!(store.list_by_type(ArtifactType::TestPlan).unwrap().is_empty());

        let approved = store
            .list_by_status(ArtifactType::ProjectPlan, ArtifactStatus::Approved)
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, b.id());
        assert!(store.has_approved(ArtifactType::ProjectPlan).unwrap());
        assert_eq!(store.list_all().unwrap().len(), 2);
    });
}

#[test]
fn resave_updates_index_status() {
    with_backends(|store| {
        let env = project_plan();
        store.save(&env).unwrap();
        let approved = env.transition(LifecycleAction::Approve).unwrap();
        store.save(&approved).unwrap();

        let entries = store.list_by_type(ArtifactType::ProjectPlan).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ArtifactStatus::Approved);
    });
}

// ===========================================================================
// Admission
// ===========================================================================

#[test]
fn missing_dependency_refused() {
    with_backends(|store| {
        let dangling = Uuid::new_v4();
        let env = impl_plan(&[dangling]);
        let err = store.save(&env).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Dependency {
                problem: DependencyProblem::Missing,
                ..
            }
        ));
        assert!(!store.exists(env.id()).unwrap());
    });
}

#[test]
fn draft_dependency_refused() {
    with_backends(|store| {
        let parent = project_plan();
        store.save(&parent).unwrap();
        let child = test_plan(&[parent.id()]);
        let err = store.save(&child).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Dependency {
                problem: DependencyProblem::Draft,
                ..
            }
        ));
    });
}

#[test]
fn approved_dependency_admitted() {
    with_backends(|store| {
        let parent = project_plan().transition(LifecycleAction::Approve).unwrap();
        store.save(&parent).unwrap();
        let child = test_plan(&[parent.id()]);
        store.save(&child).unwrap();
        assert!(store.exists(child.id()).unwrap());
    });
}

// ===========================================================================
// Immutability
// ===========================================================================

#[test]
fn locked_artifact_cannot_be_overwritten() {
    with_backends(|store| {
        let locked = test_plan(&[])
            .transition(LifecycleAction::Approve)
            .unwrap()
            .transition(LifecycleAction::Lock)
            .unwrap();
        store.save(&locked).unwrap();

        let err = store.save(&locked).unwrap_err();
        assert!(matches!(err, StorageError::Immutable { .. }));
        assert!(err.to_string().contains("LOCKED"));
    });
}

#[test]
fn locked_artifact_cannot_be_deleted() {
    with_backends(|store| {
        let locked = test_plan(&[])
            .transition(LifecycleAction::Approve)
            .unwrap()
            .transition(LifecycleAction::Lock)
            .unwrap();
        store.save(&locked).unwrap();

        let err = store.delete(locked.id()).unwrap_err();
        assert!(matches!(err, StorageError::Immutable { .. }));
        assert!(store.exists(locked.id()).unwrap());
    });
}

#[test]
fn delete_removes_draft() {
    with_backends(|store| {
        let env = project_plan();
        store.save(&env).unwrap();
        store.delete(env.id()).unwrap();
        assert!(!store.exists(env.id()).unwrap());
        assert!(store.list_all().unwrap().is_empty());
        assert!(store.delete(env.id()).unwrap_err().is_not_found());
    });
}

// ===========================================================================
// Validation at the load boundary
// ===========================================================================

#[test]
fn modified_payload_is_revalidated() {
    let env = project_plan();
    let err = env.modified(&json!({"name": ""})).unwrap_err();
    assert!(matches!(err, StorageError::Validation { .. }));
}

#[test]
fn corrupt_memory_artifact_fails_validation() {
    let store = MemoryArtifactStore::new();
    let env = project_plan();
    store.save(&env).unwrap();
    store.corrupt(env.id(), "{\"not\": \"an envelope\"}");

    let err = store.load_by_id(env.id(), None).unwrap_err();
    assert!(matches!(err, StorageError::Validation { .. }));
    assert!(store.list_all().unwrap().is_empty());
}
