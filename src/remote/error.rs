use std::time::Duration;

use thiserror::Error;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Failures talking to the remote document store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("remote store did not answer within {0:?}")]
    Timeout(Duration),
    #[error("remote store unreachable: {0}")]
    Unavailable(String),
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether retrying later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Timeout(_) | RemoteError::Unavailable(_) => true,
            RemoteError::Rejected { status, .. } => *status >= 500 || *status == 429,
            RemoteError::NotFound { .. } | RemoteError::Decode(_) => false,
        }
    }
}
