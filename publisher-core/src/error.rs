// publisher-core/src/error.rs

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::error::DomainError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};

/// Every error is `Clone` so one in-flight load can report the same failure to
/// all of its waiters.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum PublisherError {
    // --- DOMAIN (not found, frozen, validation) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE (IO, parsing, engines, remotes) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Unsafe path traversal detected: {0}")]
    UnsafePath(String),
}

impl PublisherError {
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            PublisherError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.as_domain(), Some(DomainError::FrozenConfig))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.as_domain(),
            Some(
                DomainError::ProjectNotFound(_)
                    | DomainError::PackageNotFound(_)
                    | DomainError::ConnectionNotFound { .. }
                    | DomainError::ModelNotFound { .. }
            )
        )
    }
}

// Shortcuts so `?` works on the common foreign errors.
impl From<std::io::Error> for PublisherError {
    fn from(err: std::io::Error) -> Self {
        PublisherError::Infrastructure(InfrastructureError::Io(Arc::new(err)))
    }
}

impl From<duckdb::Error> for PublisherError {
    fn from(err: duckdb::Error) -> Self {
        PublisherError::Infrastructure(InfrastructureError::Database(DatabaseError::DuckDB(
            Arc::new(err),
        )))
    }
}

impl From<serde_json::Error> for PublisherError {
    fn from(err: serde_json::Error) -> Self {
        PublisherError::Infrastructure(InfrastructureError::Json(Arc::new(err)))
    }
}

impl From<object_store::Error> for PublisherError {
    fn from(err: object_store::Error) -> Self {
        PublisherError::Infrastructure(InfrastructureError::ObjectStore(Arc::new(err)))
    }
}
