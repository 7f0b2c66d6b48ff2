//! Schema-only validation at every load boundary.

use crate::error::StorageError;
use crate::payload::ArtifactPayload;
use crate::schema::{ArtifactEnvelope, ArtifactType, RawEnvelope};

/// Validates raw artifact JSON without consulting any store.
pub trait ValidatorPort: Send + Sync {
    /// Parse and validate a full envelope.
    fn validate(&self, raw: &str) -> Result<ArtifactEnvelope, StorageError>;

    /// Parse and validate a payload for the given type.
    fn validate_payload(
        &self,
        raw: &serde_json::Value,
        artifact_type: ArtifactType,
    ) -> Result<ArtifactPayload, StorageError>;
}

/// The default validator: serde shape plus payload rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl ValidatorPort for SchemaValidator {
    fn validate(&self, raw: &str) -> Result<ArtifactEnvelope, StorageError> {
        let envelope: RawEnvelope = serde_json::from_str(raw)
            .map_err(|e| StorageError::validation(format!("malformed envelope: {e}")))?;
        ArtifactEnvelope::try_from(envelope)
    }

    fn validate_payload(
        &self,
        raw: &serde_json::Value,
        artifact_type: ArtifactType,
    ) -> Result<ArtifactPayload, StorageError> {
        ArtifactPayload::from_value(artifact_type, raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_rejects_garbage() {
        let err = SchemaValidator.validate("{not json").unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let err = SchemaValidator
            .validate(r#"{"id": "00000000-0000-0000-0000-000000000000"}"#)
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[test]
    fn test_validate_payload_for_type() {
        let payload = SchemaValidator
            .validate_payload(
                &json!({"summary": "do it", "files": ["src/lib.rs"]}),
                ArtifactType::ImplementationPlan,
            )
            .unwrap();
        assert_eq!(payload.artifact_type(), ArtifactType::ImplementationPlan);
    }

    #[test]
    fn test_validate_roundtrip_from_envelope_json() {
        let payload = SchemaValidator
            .validate_payload(&json!({"name": "demo"}), ArtifactType::ProjectPlan)
            .unwrap();
        let env = ArtifactEnvelope::draft(payload, "bob", []).unwrap();
        let loaded = SchemaValidator.validate(&env.to_json().unwrap()).unwrap();
        assert_eq!(loaded, env);
    }
}
