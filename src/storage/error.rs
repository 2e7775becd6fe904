//! Errors produced by the storage layer.

use thiserror::Error;

/// Errors returned by the cache store, the expiration index and the engine.
///
/// The `Display` text is what clients see after the `ERR ` prefix.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Memory for the new entry could not be reserved. Nothing was modified.
    #[error("out of memory")]
    OutOfMemory,

    /// A cache cannot have zero capacity.
    #[error("capacity must be greater than zero")]
    InvalidCapacity,

    #[error("key too long")]
    KeyTooLong { len: usize, max: usize },

    #[error("value too large")]
    ValueTooLarge { len: usize, max: usize },

    /// INCR/DECR on a value that is not a base-10 integer.
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// INCR/DECR whose result does not fit in an `i64`.
    #[error("value is not an integer or out of range")]
    Overflow,
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
