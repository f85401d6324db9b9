//! Error types for host catalog and bus coordination.

use thiserror::Error;

/// top-level error type for the inventory crate.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// NATS connection or transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// the client is not connected, or the connection was lost.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// serialization or deserialization failure.
    #[error("codec error: {0}")]
    Codec(String),
}

/// shorthand result alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;
