use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The payload was not a message envelope at all.
    #[error("{0}")]
    Protocol(String),
    #[error("{0}")]
    Validation(String),
    #[error("Failed to save trace: {0}")]
    Store(#[from] StoreError),
}
