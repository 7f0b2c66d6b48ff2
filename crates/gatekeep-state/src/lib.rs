//! Gatekeep-State: artifact model and persistence for Gatekeep
//!
//! This crate owns the artifact envelope, its lifecycle transition function,
//! schema validation, and the storage backends. Nothing here executes code
//! or touches the repository being governed.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: schema integrity, atomic writes, and lifecycle legality.
//!
//! ## Key Components
//!
//! - `ArtifactEnvelope`: typed, versioned artifact with private state
//! - `next_status`: the pure DRAFT/APPROVED/LOCKED transition function
//! - `StoragePort`: backend contract, with `FsArtifactStore` and
//!   `MemoryArtifactStore` implementations

mod error;
pub mod fakes;
pub mod fs_store;
pub mod payload;
mod schema;
pub mod storage_traits;
pub mod transition;
mod validator;

pub use error::{DependencyProblem, StorageError};
pub use fakes::MemoryArtifactStore;
pub use fs_store::{write_atomic, FsArtifactStore};
pub use payload::{
    ArchitecturePlan, ArtifactPayload, Component, EntryKind, ImplementationPlan, ProjectPlan,
    ReconciliationPlan, RefactorOperation, RefactorPlan, ScaffoldEntry, ScaffoldPlan, TestPlan,
    ValidationResult,
};
pub use schema::{ArtifactEnvelope, ArtifactStatus, ArtifactType, RawEnvelope, RegistryEntry};
pub use storage_traits::{StoragePort, StorageResult};
pub use transition::{next_status, LifecycleAction, TransitionError};
pub use validator::{SchemaValidator, ValidatorPort};
