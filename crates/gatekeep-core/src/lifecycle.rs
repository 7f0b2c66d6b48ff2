//! Artifact registration and lifecycle transitions.
//!
//! Every status or payload change goes through
//! [`ArtifactEnvelope::transition`] / [`ArtifactEnvelope::modified`] and is
//! persisted through the store, which re-checks dependencies and refuses to
//! overwrite a LOCKED artifact.

use std::collections::BTreeSet;
use std::sync::Arc;

use gatekeep_state::{
    ArtifactEnvelope, ArtifactPayload, ArtifactStatus, ArtifactType, LifecycleAction, StorageError,
    StoragePort,
};
use serde_json::Value;
use uuid::Uuid;

use crate::approvals::{Approval, ApprovalTracker};
use crate::domain::ArtifactError;
use crate::obs::emit_transition;

#[derive(Clone)]
pub struct ArtifactLifecycle {
    store: Arc<dyn StoragePort>,
    approvals: ApprovalTracker,
}

impl ArtifactLifecycle {
    pub fn new(store: Arc<dyn StoragePort>, approvals: ApprovalTracker) -> Self {
        Self { store, approvals }
    }

    pub fn store(&self) -> &Arc<dyn StoragePort> {
        &self.store
    }

    pub fn approvals(&self) -> &ApprovalTracker {
        &self.approvals
    }

    /// Save a new DRAFT artifact. Dependencies must already be APPROVED or LOCKED.
    pub fn register(
        &self,
        payload: ArtifactPayload,
        created_by: &str,
        depends_on: impl IntoIterator<Item = Uuid>,
    ) -> Result<ArtifactEnvelope, ArtifactError> {
        let envelope = ArtifactEnvelope::draft(payload, created_by, depends_on)?;
        self.store.save(&envelope)?;
        tracing::info!(
            artifact = %envelope.id(),
            artifact_type = %envelope.artifact_type(),
            created_by = %created_by,
            "artifact registered"
        );
        Ok(envelope)
    }

    /// Parse `payload` as `artifact_type` and register it.
    pub fn register_raw(
        &self,
        artifact_type: ArtifactType,
        payload: Value,
        created_by: &str,
        depends_on: impl IntoIterator<Item = Uuid>,
    ) -> Result<ArtifactEnvelope, ArtifactError> {
        let payload = ArtifactPayload::from_value(artifact_type, payload)?;
        self.register(payload, created_by, depends_on)
    }

    pub fn get(&self, id: Uuid) -> Result<ArtifactEnvelope, ArtifactError> {
        Ok(self.store.load_by_id(id, None)?)
    }

    /// Validate `action` against the stored artifact without saving.
    fn prepare(
        &self,
        id: Uuid,
        action: LifecycleAction,
    ) -> Result<(ArtifactStatus, ArtifactEnvelope), ArtifactError> {
        let current = self.get(id)?;
        let from = current.status();
        let next = current
            .transition(action)
            .map_err(|e| ArtifactError::transition(id, e))?;
        Ok((from, next))
    }

    fn commit(
        &self,
        action: LifecycleAction,
        from: ArtifactStatus,
        next: ArtifactEnvelope,
    ) -> Result<ArtifactEnvelope, ArtifactError> {
        self.store.save(&next)?;
        emit_transition(
            &next.id().to_string(),
            &action.to_string(),
            &from.to_string(),
            &next.status().to_string(),
        );
        Ok(next)
    }

    fn apply(
        &self,
        id: Uuid,
        action: LifecycleAction,
    ) -> Result<ArtifactEnvelope, ArtifactError> {
        let (from, next) = self.prepare(id, action)?;
        self.commit(action, from, next)
    }

    /// DRAFT -> APPROVED, recording who approved it.
    ///
    /// The approval record is written first and dropped again if the status
    /// cannot be saved, so an APPROVED artifact always has its approver.
    pub fn approve(&self, id: Uuid, approved_by: &str) -> Result<ArtifactEnvelope, ArtifactError> {
        let (from, next) = self.prepare(id, LifecycleAction::Approve)?;
        self.approvals.record(id, approved_by)?;
        self.commit(LifecycleAction::Approve, from, next)
            .inspect_err(|_| {
                if let Err(e) = self.approvals.clear(id) {
                    tracing::warn!(artifact = %id, error = %e, "failed to roll back approval record");
                }
            })
    }

    /// APPROVED -> LOCKED, TEST_PLAN only. Irreversible.
    pub fn lock(&self, id: Uuid) -> Result<ArtifactEnvelope, ArtifactError> {
        self.apply(id, LifecycleAction::Lock)
    }

    /// APPROVED -> DRAFT, clearing the approval record.
    pub fn revoke(&self, id: Uuid) -> Result<ArtifactEnvelope, ArtifactError> {
        let revoked = self.apply(id, LifecycleAction::Revoke)?;
        self.approvals.clear(id)?;
        Ok(revoked)
    }

    /// Merge `updates` into a DRAFT artifact's payload and bump its version.
    pub fn modify(&self, id: Uuid, updates: &Value) -> Result<ArtifactEnvelope, ArtifactError> {
        let current = self.get(id)?;
        let modified = current.modified(updates).map_err(|e| match e {
            StorageError::Transition(t) => ArtifactError::transition(id, t),
            other => ArtifactError::from(other),
        })?;
        self.store.save(&modified)?;
        tracing::info!(artifact = %id, version = modified.version(), "artifact modified");
        Ok(modified)
    }

    pub fn approval(&self, id: Uuid) -> Option<Approval> {
        self.approvals.get(id)
    }

    /// Ids this artifact depends on that are not APPROVED or LOCKED now.
    ///
    /// Admission already refused these at save time; a later revoke can
    /// reintroduce them.
    pub fn unapproved_dependencies(&self, id: Uuid) -> Result<BTreeSet<Uuid>, ArtifactError> {
        let envelope = self.get(id)?;
        let mut missing = BTreeSet::new();
        for dep in envelope.depends_on() {
            match self.store.load_by_id(*dep, None) {
                Ok(d) if d.status().is_approved() => {}
                Ok(_) => {
                    missing.insert(*dep);
                }
                Err(e) if e.is_not_found() => {
                    missing.insert(*dep);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(missing)
    }
}
