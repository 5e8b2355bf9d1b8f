//! Error taxonomy shared by the ledger, registry, and orchestrator.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by control plane operations.
///
/// Callers branch on the variant, never on message text.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown id or version label.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed payload, missing required field, or duplicate unique field.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage I/O or constraint failure.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Remote node call failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, Error>;
