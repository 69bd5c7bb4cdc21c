//! Client errors.

use thiserror::Error;

/// Errors raised while consuming a status stream.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Stream transport failed: {0}")]
    Transport(String),
    #[error("Stream ended without a completion marker")]
    UnexpectedEof,
    #[error("Job failed: {0}")]
    Job(String),
    #[error("No result received")]
    NoResult,
}
