//! Error types for the Canopy engine.

use crate::{EntityId, RemoteKey, SiteId};
use thiserror::Error;

/// All possible errors from the Canopy engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("site not found: {0}")]
    SiteNotFound(SiteId),

    #[error("unknown sync type: {0}")]
    UnknownSyncType(String),

    // Validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    // Mapping errors
    #[error("entity already exists: {0}")]
    EntityAlreadyExists(EntityId),

    #[error("remote record {remote_key} is already linked to {local_id}")]
    AlreadyLinked {
        remote_key: RemoteKey,
        local_id: EntityId,
    },

    #[error("entity {local_id} is already mapped to remote record {remote_key}")]
    MappingConflict {
        local_id: EntityId,
        remote_key: RemoteKey,
    },

    #[error("remote record {0} has not been observed in the registry")]
    NotEligible(RemoteKey),

    #[error("duplicate remote mapping {remote_key}: already held by {holder}")]
    InvariantViolation { remote_key: RemoteKey, holder: EntityId },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
