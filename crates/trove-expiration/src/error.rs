//! Error types for expiration operations

use thiserror::Error;

/// Errors that can occur during expiration operations
#[derive(Error, Debug)]
pub enum ExpirationError {
    /// The run-scoped staging state could not be created; the service
    /// stays inert.
    #[error("Setup failed: {0}")]
    Setup(String),

    /// A run's transaction failed; the whole run was rolled back.
    #[error("Storage error: {0}")]
    Store(String),
}
