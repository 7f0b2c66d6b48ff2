//! Structured observability hooks for executor and lifecycle events.
//!
//! This module provides:
//! - Execution-scoped tracing spans via [`execution_span`]
//! - Emission functions for key events: execution start/finish, stage
//!   failure, artifact transitions, phase denials, lock violations
//!
//! These are diagnostics only. The durable record of every execution is the
//! audit log.

use tracing::{info, warn};

/// Execution-scoped span for one pipeline run.
///
/// Futures are instrumented with it rather than entering it, so the span
/// never has to be held across an `.await`:
///
/// ```ignore
/// pipeline.run(..).instrument(execution_span("scaffold", "5f0c…")).await
/// // every event inside carries executor=scaffold reference=5f0c…
/// ```
pub fn execution_span(executor: &str, reference: &str) -> tracing::Span {
    tracing::info_span!(
        "gatekeep.execution",
        executor = %executor,
        reference = %reference
    )
}

pub fn emit_execution_started(executor: &str, reference: &str, mode: &str) {
    info!(
        event = "executor.started",
        executor = %executor,
        reference = %reference,
        mode = %mode,
    );
}

/// Emit event: execution finished with duration and outcome.
pub fn emit_execution_finished(executor: &str, reference: &str, duration_ms: u64, success: bool) {
    info!(
        event = "executor.finished",
        executor = %executor,
        reference = %reference,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: a pipeline stage rejected the invocation (warning level).
pub fn emit_stage_failed(executor: &str, stage: u8, error: &dyn std::fmt::Display) {
    warn!(
        event = "executor.stage_failed",
        executor = %executor,
        stage = stage,
        error = %error,
    );
}

pub fn emit_transition(artifact: &str, action: &str, from: &str, to: &str) {
    info!(
        event = "artifact.transition",
        artifact = %artifact,
        action = %action,
        from = %from,
        to = %to,
    );
}

pub fn emit_phase_denied(command: &str, current: &str, required: &str) {
    warn!(
        event = "phase.denied",
        command = %command,
        current = %current,
        required = %required,
    );
}

/// Emit event: a diff tried to touch tests frozen by a locked test plan.
pub fn emit_lock_violation(test_plan_id: &str, files: &[String]) {
    warn!(
        event = "safety.lock_violation",
        test_plan_id = %test_plan_id,
        files = ?files,
    );
}
