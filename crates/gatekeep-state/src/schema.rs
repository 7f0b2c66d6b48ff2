//! Artifact envelope schema.
//!
//! On disk an envelope is a JSON object:
//!
//! ```json
//! {
//!   "id": "…uuid…",
//!   "artifact_type": "SCAFFOLD_PLAN",
//!   "version": 1,
//!   "status": "DRAFT",
//!   "created_by": "operator",
//!   "created_at": "2024-01-01T00:00:00Z",
//!   "depends_on": ["…uuid…"],
//!   "payload": { … }
//! }
//! ```
//!
//! Envelope fields are private. Status and payload only change through
//! [`ArtifactEnvelope::transition`] and [`ArtifactEnvelope::modified`], both
//! of which consult [`next_status`](crate::transition::next_status).

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::payload::ArtifactPayload;
use crate::transition::{next_status, LifecycleAction, TransitionError};

/// The kind of planning/result document an artifact carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactType {
    ProjectPlan,
    ArchitecturePlan,
    ScaffoldPlan,
    TestPlan,
    ImplementationPlan,
    RefactorPlan,
    ValidationResult,
    ReconciliationPlan,
}

impl ArtifactType {
    pub const ALL: [ArtifactType; 8] = [
        ArtifactType::ProjectPlan,
        ArtifactType::ArchitecturePlan,
        ArtifactType::ScaffoldPlan,
        ArtifactType::TestPlan,
        ArtifactType::ImplementationPlan,
        ArtifactType::RefactorPlan,
        ArtifactType::ValidationResult,
        ArtifactType::ReconciliationPlan,
    ];

    /// Canonical wire name, e.g. `TEST_PLAN`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::ProjectPlan => "PROJECT_PLAN",
            ArtifactType::ArchitecturePlan => "ARCHITECTURE_PLAN",
            ArtifactType::ScaffoldPlan => "SCAFFOLD_PLAN",
            ArtifactType::TestPlan => "TEST_PLAN",
            ArtifactType::ImplementationPlan => "IMPLEMENTATION_PLAN",
            ArtifactType::RefactorPlan => "REFACTOR_PLAN",
            ArtifactType::ValidationResult => "VALIDATION_RESULT",
            ArtifactType::ReconciliationPlan => "RECONCILIATION_PLAN",
        }
    }

    /// Directory under the artifacts root holding this type.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactType::ProjectPlan => "project_plans",
            ArtifactType::ArchitecturePlan => "architecture_plans",
            ArtifactType::ScaffoldPlan => "scaffold_plans",
            ArtifactType::TestPlan => "test_plans",
            ArtifactType::ImplementationPlan => "implementation_plans",
            ArtifactType::RefactorPlan => "refactor_plans",
            ArtifactType::ValidationResult => "validation_results",
            ArtifactType::ReconciliationPlan => "reconciliation_plans",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = StorageError;

    /// Accepts the wire name (`TEST_PLAN`) or a short command-line form
    /// (`tests`, `test-plan`, `implementation`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        let t = match normalized.as_str() {
            "PROJECT_PLAN" | "PROJECT" => ArtifactType::ProjectPlan,
            "ARCHITECTURE_PLAN" | "ARCHITECTURE" => ArtifactType::ArchitecturePlan,
            "SCAFFOLD_PLAN" | "SCAFFOLD" => ArtifactType::ScaffoldPlan,
            "TEST_PLAN" | "TESTS" | "TEST" => ArtifactType::TestPlan,
            "IMPLEMENTATION_PLAN" | "IMPLEMENTATION" | "IMPL" => ArtifactType::ImplementationPlan,
            "REFACTOR_PLAN" | "REFACTOR" => ArtifactType::RefactorPlan,
            "VALIDATION_RESULT" | "VALIDATION" => ArtifactType::ValidationResult,
            "RECONCILIATION_PLAN" | "RECONCILIATION" => ArtifactType::ReconciliationPlan,
            _ => {
                return Err(StorageError::validation(format!(
                    "unknown artifact type: {s}"
                )))
            }
        };
        Ok(t)
    }
}

/// Approval state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactStatus {
    Draft,
    Approved,
    Locked,
}

impl ArtifactStatus {
    /// APPROVED or LOCKED: usable as a dependency or executor input.
    pub fn is_approved(&self) -> bool {
        matches!(self, ArtifactStatus::Approved | ArtifactStatus::Locked)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactStatus::Draft => "DRAFT",
            ArtifactStatus::Approved => "APPROVED",
            ArtifactStatus::Locked => "LOCKED",
        };
        f.write_str(s)
    }
}

/// Wire form of an envelope, before the payload is checked against its type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub id: Uuid,
    pub artifact_type: ArtifactType,
    pub version: u32,
    pub status: ArtifactStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub depends_on: BTreeSet<Uuid>,
    pub payload: serde_json::Value,
}

/// A versioned, typed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct ArtifactEnvelope {
    id: Uuid,
    artifact_type: ArtifactType,
    version: u32,
    status: ArtifactStatus,
    created_by: String,
    created_at: DateTime<Utc>,
    depends_on: BTreeSet<Uuid>,
    payload: ArtifactPayload,
}

impl TryFrom<RawEnvelope> for ArtifactEnvelope {
    type Error = StorageError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        if raw.version == 0 {
            return Err(StorageError::validation("version must be >= 1"));
        }
        if raw.created_by.trim().is_empty() {
            return Err(StorageError::validation("created_by must not be empty"));
        }
        if raw.status == ArtifactStatus::Locked && raw.artifact_type != ArtifactType::TestPlan {
            return Err(StorageError::validation(format!(
                "{} artifact cannot be LOCKED",
                raw.artifact_type
            )));
        }
        if raw.depends_on.contains(&raw.id) {
            return Err(StorageError::validation(
                "artifact cannot depend on itself",
            ));
        }
        let payload = ArtifactPayload::from_value(raw.artifact_type, raw.payload)?;
        Ok(Self {
            id: raw.id,
            artifact_type: raw.artifact_type,
            version: raw.version,
            status: raw.status,
            created_by: raw.created_by,
            created_at: raw.created_at,
            depends_on: raw.depends_on,
            payload,
        })
    }
}

impl ArtifactEnvelope {
    /// Create a new DRAFT artifact at version 1.
    ///
    /// The artifact type is taken from the payload, so the two always agree.
    pub fn draft(
        payload: ArtifactPayload,
        created_by: impl Into<String>,
        depends_on: impl IntoIterator<Item = Uuid>,
    ) -> Result<Self, StorageError> {
        payload.check()?;
        let created_by = created_by.into();
        if created_by.trim().is_empty() {
            return Err(StorageError::validation("created_by must not be empty"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            artifact_type: payload.artifact_type(),
            version: 1,
            status: ArtifactStatus::Draft,
            created_by,
            created_at: Utc::now(),
            depends_on: depends_on.into_iter().collect(),
            payload,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn artifact_type(&self) -> ArtifactType {
        self.artifact_type
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn status(&self) -> ArtifactStatus {
        self.status
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn depends_on(&self) -> &BTreeSet<Uuid> {
        &self.depends_on
    }

    pub fn payload(&self) -> &ArtifactPayload {
        &self.payload
    }

    /// Apply a status transition, returning the new envelope.
    pub fn transition(self, action: LifecycleAction) -> Result<Self, TransitionError> {
        let status = next_status(self.artifact_type, self.status, action)?;
        Ok(Self { status, ..self })
    }

    /// Shallow-merge `updates` into the payload and bump the version.
    ///
    /// Only DRAFT artifacts can be modified. The merged payload is re-validated
    /// against the artifact type.
    pub fn modified(self, updates: &serde_json::Value) -> Result<Self, StorageError> {
        next_status(self.artifact_type, self.status, LifecycleAction::Modify)?;
        let serde_json::Value::Object(updates) = updates else {
            return Err(StorageError::validation("payload updates must be a JSON object"));
        };

        let mut merged = self.payload.to_value()?;
        let serde_json::Value::Object(ref mut fields) = merged else {
            return Err(StorageError::validation("stored payload is not a JSON object"));
        };
        for (key, value) in updates {
            fields.insert(key.clone(), value.clone());
        }

        let payload = ArtifactPayload::from_value(self.artifact_type, merged)?;
        Ok(Self {
            payload,
            version: self.version + 1,
            ..self
        })
    }

    /// Wire form of this envelope.
    pub fn to_raw(&self) -> Result<RawEnvelope, StorageError> {
        Ok(RawEnvelope {
            id: self.id,
            artifact_type: self.artifact_type,
            version: self.version,
            status: self.status,
            created_by: self.created_by.clone(),
            created_at: self.created_at,
            depends_on: self.depends_on.clone(),
            payload: self.payload.to_value()?,
        })
    }

    /// Pretty JSON suitable for writing to disk.
    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(&self.to_raw()?)?)
    }
}

/// Cheap projection of an envelope for type/status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: Uuid,
    pub artifact_type: ArtifactType,
    /// Path relative to the artifacts root.
    pub path: PathBuf,
    pub status: ArtifactStatus,
    pub created_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn for_envelope(envelope: &ArtifactEnvelope, path: PathBuf) -> Self {
        Self {
            id: envelope.id(),
            artifact_type: envelope.artifact_type(),
            path,
            status: envelope.status(),
            created_at: envelope.created_at(),
        }
    }
}
