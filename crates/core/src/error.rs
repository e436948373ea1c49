use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable document {path}: {details}")]
    Unreadable { path: String, details: String },

    #[error("document has no pages: {path}")]
    Empty { path: String },
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index '{index}' has dimension {existing}, requested {requested}")]
    DimensionMismatch {
        index: String,
        existing: usize,
        requested: usize,
    },

    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("write to {backend} failed: {details}")]
    StoreWrite { backend: String, details: String },

    #[error("query against {backend} failed: {details}")]
    StoreQuery { backend: String, details: String },

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("completion service error: {0}")]
    CompletionService(String),

    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
}

/// Coarse classification a host can map onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Upstream,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Document(DocumentError::Io(_)) => ErrorKind::Upstream,
            RagError::Document(_) | RagError::InvalidArgument(_) => ErrorKind::InvalidInput,
            RagError::DimensionMismatch { .. } => ErrorKind::InvalidInput,
            RagError::IndexNotFound(_) => ErrorKind::NotFound,
            RagError::EmbeddingService(_)
            | RagError::StoreWrite { .. }
            | RagError::StoreQuery { .. }
            | RagError::CompletionService(_)
            | RagError::Timeout { .. } => ErrorKind::Upstream,
        }
    }

    pub(crate) fn store_write(backend: &str, details: impl ToString) -> Self {
        RagError::StoreWrite {
            backend: backend.to_string(),
            details: details.to_string(),
        }
    }

    pub(crate) fn store_query(backend: &str, details: impl ToString) -> Self {
        RagError::StoreQuery {
            backend: backend.to_string(),
            details: details.to_string(),
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
