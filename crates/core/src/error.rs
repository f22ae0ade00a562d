//! Workspace-level error type
//!
//! Per-crate error enums convert into this at the HTTP boundary. Only three
//! kinds are visible to callers: invalid input (400), missing vector
//! collections (503) and everything else (500).

use thiserror::Error;

/// Top-level error for the search service
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input was invalid; never enters the pipeline
    #[error("validation error: {0}")]
    Validation(String),

    /// A vector collection does not exist yet (indexes uninitialized)
    #[error("Collection not found")]
    CollectionNotFound,

    /// Any other failure the pipeline could not contain
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status code this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::CollectionNotFound => 503,
            Error::Internal(_) => 500,
        }
    }
}
