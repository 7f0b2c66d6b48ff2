//! Gatekeep Core: governance services for AI-assisted repository changes
//!
//! ## Layer 1 - Governance
//!
//! Focus: phase gating, lifecycle enforcement, safety checks, and the
//! audited executors that are the only code allowed to modify the target
//! repository.
//!
//! ## Key Components
//!
//! - `Project`: one governed repository with every service wired together
//! - `PhaseGate`: derives the workflow phase and refuses out-of-order commands
//! - `ArtifactLifecycle`: DRAFT/APPROVED/LOCKED transitions with dependency checks
//! - `Pipeline`: the nine-stage executor driver behind scaffold, diff and refactor
//! - `SafetyEnforcer`: test-lock integrity, locked-test and authorization checks
//! - `AuditLog`: append-only execution log with archived diffs

pub mod approvals;
pub mod audit;
pub mod capability;
pub mod config;
pub mod diff_lifecycle;
pub mod domain;
pub mod executor;
pub mod git;
pub mod language;
pub mod lifecycle;
pub mod obs;
pub mod phase;
pub mod project;
pub mod runner;
pub mod safety;
pub mod telemetry;
pub mod validation;

pub use approvals::{Approval, ApprovalTracker};
pub use audit::{AuditError, AuditLog, AuditLogEntry, Outcome};
pub use capability::{
    CapabilityError, CapabilityRegistry, CapabilityStatus, OPERATIONS, OP_APPLY_DIFF,
    OP_MOVE_FILE, OP_RENAME_SYMBOL, OP_SCAFFOLD,
};
pub use config::{ConfigError, GatekeepConfig, CONFIG_FILE};
pub use diff_lifecycle::{Diff, DiffError, DiffLifecycle, DiffStatus};
pub use domain::{
    ArtifactError, ErrorKind, ExecutorError, GatekeepError, PhaseError, Result, SafetyError,
};
pub use executor::{
    DiffStages, ExecutionMode, ExecutionResult, Executor, Pipeline, PipelineStages,
    RefactorStages, ScaffoldStages,
};
pub use language::detect_language;
pub use lifecycle::ArtifactLifecycle;
pub use phase::{GatedCommand, Phase, PhaseGate};
pub use project::{DiagnosticReport, Project, ResumeReport, StatusReport};
pub use runner::{run_command, CommandOutput};
pub use safety::{LockRecord, LockReport, LockStore, SafetyEnforcer, TestPatterns};
pub use validation::Validator;

pub use obs::{
    emit_execution_finished, emit_execution_started, emit_lock_violation, emit_phase_denied,
    emit_stage_failed, emit_transition, execution_span,
};
pub use telemetry::init_tracing;

/// Gatekeep version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
