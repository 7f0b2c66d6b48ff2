//! Pure lifecycle transition function for artifact status.
//!
//! ```text
//! DRAFT --approve--> APPROVED --lock--> LOCKED   (TEST_PLAN only)
//!   ^                    |
//!   +------revoke--------+
//! ```
//!
//! `next_status` is the only place that decides whether a status change is
//! legal. [`ArtifactEnvelope`](crate::ArtifactEnvelope) routes every status or
//! payload change through it.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{ArtifactStatus, ArtifactType};

/// A requested lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Approve,
    Lock,
    Revoke,
    Modify,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleAction::Approve => "approve",
            LifecycleAction::Lock => "lock",
            LifecycleAction::Revoke => "revoke",
            LifecycleAction::Modify => "modify",
        };
        f.write_str(s)
    }
}

/// A refused transition.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionError {
    #[error("cannot {action} an artifact in status {from}: it must be {expected}")]
    WrongStatus {
        action: LifecycleAction,
        from: ArtifactStatus,
        expected: ArtifactStatus,
    },

    #[error("cannot lock a {artifact_type} artifact: only TEST_PLAN artifacts can be LOCKED")]
    NotLockable { artifact_type: ArtifactType },

    #[error("cannot {action}: artifact is LOCKED and immutable")]
    Immutable { action: LifecycleAction },
}

/// Compute the status that results from applying `action`.
///
/// `Modify` does not change the status; it succeeds only on DRAFT.
pub fn next_status(
    artifact_type: ArtifactType,
    from: ArtifactStatus,
    action: LifecycleAction,
) -> Result<ArtifactStatus, TransitionError> {
    if from == ArtifactStatus::Locked {
        return Err(TransitionError::Immutable { action });
    }

    match action {
        LifecycleAction::Approve => expect_status(action, from, ArtifactStatus::Draft)
            .map(|()| ArtifactStatus::Approved),
        LifecycleAction::Lock => {
            if artifact_type != ArtifactType::TestPlan {
                return Err(TransitionError::NotLockable { artifact_type });
            }
            expect_status(action, from, ArtifactStatus::Approved).map(|()| ArtifactStatus::Locked)
        }
        LifecycleAction::Revoke => expect_status(action, from, ArtifactStatus::Approved)
            .map(|()| ArtifactStatus::Draft),
        LifecycleAction::Modify => {
            expect_status(action, from, ArtifactStatus::Draft).map(|()| ArtifactStatus::Draft)
        }
    }
}

fn expect_status(
    action: LifecycleAction,
    from: ArtifactStatus,
    expected: ArtifactStatus,
) -> Result<(), TransitionError> {
    if from == expected {
        Ok(())
    } else {
        Err(TransitionError::WrongStatus {
            action,
            from,
            expected,
        })
    }
}
