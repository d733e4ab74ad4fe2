//! Error types for ranker-state

use thiserror::Error;

/// Errors raised while connecting to a store or preparing its schema
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the repository traits.
///
/// Every backend (SurrealDB, in-memory fakes) maps its failures onto these
/// variants so callers never see engine-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A keyed record does not exist
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A guarded write lost a race against a concurrent writer
    #[error("write conflict on {entity} {key}")]
    Conflict { entity: &'static str, key: String },

    /// The store cannot be reached at all
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored opaque document failed boundary validation
    #[error("invalid document {key}: {reason}")]
    InvalidDocument { key: String, reason: String },

    /// Any other backend failure (query, transaction, decode)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// True when a retry of the same operation may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Connection(msg) => StorageError::Unavailable(msg),
            other => StorageError::Backend(other.to_string()),
        }
    }
}
