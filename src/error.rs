//! Error types
//!
//! Only failures the caller must act on surface here. Cache transport
//! failures and oversize writes are absorbed inside
//! [`DistributedCache`](crate::distributed::DistributedCache) and never
//! reach this enum.

use crate::store::RecordKey;

/// Errors returned by the facade and the record DAOs
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Snapshot reentrancy or ownership was violated. The snapshot session
    /// has already been cleared when this is returned.
    #[error("snapshot invariant violated: {0}")]
    InvariantViolation(String),

    /// A uniqueness rule enforced at the DAO layer was broken
    #[error("non-unique {kind} {field}: {value}")]
    Collision {
        kind: String,
        field: String,
        value: String,
    },

    /// The authoritative record store failed
    #[error("record store failure")]
    Store(#[source] anyhow::Error),

    /// A stored payload could not be decoded into a JSON object
    #[error("failed to decode {kind} record {key}")]
    Decode {
        kind: String,
        key: RecordKey,
        #[source]
        source: anyhow::Error,
    },

    /// A DTO payload could not be encoded for storage
    #[error("failed to encode {kind} record")]
    Encode {
        kind: String,
        #[source]
        source: anyhow::Error,
    },

    /// The key does not fit the DAO's key strategy
    #[error("invalid {kind} key {key}: {reason}")]
    InvalidKey {
        kind: String,
        key: RecordKey,
        reason: &'static str,
    },

    /// A name-keyed record was saved without a name
    #[error("{kind} records require a caller-supplied key")]
    MissingKey { kind: String },

    /// The record addressed by a delete does not exist
    #[error("{kind} record {key} not found")]
    NotFound { kind: String, key: RecordKey },
}

/// Result alias used across the public API
pub type Result<T> = std::result::Result<T, Error>;
