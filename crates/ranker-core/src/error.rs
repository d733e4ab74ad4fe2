//! Error taxonomy for the ranker services

use ranker_state::StorageError;
use thiserror::Error;

use crate::search::{EncoderError, IndexError};

/// Result type for ranker-core operations
pub type Result<T> = std::result::Result<T, RankerError>;

#[derive(Error, Debug)]
pub enum RankerError {
    /// Input outside its documented bounds
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A dependency (index, recommendation store) cannot serve requests
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Coarse response class of an error, as a transport would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unavailable,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status hint.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }
}

impl RankerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RankerError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        RankerError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RankerError::Validation(_) => ErrorKind::Validation,
            RankerError::NotFound { .. } => ErrorKind::NotFound,
            RankerError::ServiceUnavailable(_) => ErrorKind::Unavailable,
            RankerError::Storage(StorageError::NotFound { .. }) => ErrorKind::NotFound,
            RankerError::Storage(StorageError::Unavailable(_)) => ErrorKind::Unavailable,
            RankerError::Storage(_) | RankerError::Index(_) | RankerError::Encoder(_) => {
                ErrorKind::Internal
            }
        }
    }
}
