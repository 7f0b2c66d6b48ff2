//! Domain error taxonomy for Gatekeep.
//!
//! The artifact model itself lives in `gatekeep-state`; this module holds
//! the errors every governance service reports through.

pub mod error;

pub use error::{
    ArtifactError, ErrorKind, ExecutorError, GatekeepError, PhaseError, Result, SafetyError,
};
