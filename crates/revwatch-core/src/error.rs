//! Error types for the reconciliation pipeline.

use std::path::PathBuf;

use crate::types::ObjectRef;

/// Failures of the archive retriever.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid artifact URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("artifact at {url} exceeds the download limit of {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("invalid digest '{digest}': {reason}")]
    InvalidDigest { digest: String, reason: String },

    #[error("digest mismatch: expected {expected}, computed {actual}")]
    Integrity { expected: String, actual: String },

    #[error("archive entry '{entry}' resolves outside {}", dest.display())]
    PathTraversal { entry: String, dest: PathBuf },

    #[error("archive expands beyond the extraction limit of {limit} bytes")]
    ExtractionTooLarge { limit: u64 },

    #[error("failed to read archive: {0}")]
    Archive(#[source] std::io::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Whether another download attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Failures while synthesizing target documents.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to encode target resource for entry '{entry}': {source}")]
    Serialization {
        entry: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Classified failures of the cluster API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{kind} {object} not found")]
    NotFound { kind: String, object: ObjectRef },

    #[error("conflict writing {kind} {object}: {message}")]
    Conflict {
        kind: String,
        object: ObjectRef,
        message: String,
    },

    #[error("cluster API returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("cluster API transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to decode cluster API response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }
}

/// Failures of a single upsert.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{0}")]
    Conflict(#[source] ApiError),

    #[error("failed to {operation} {object}: {source}")]
    Fatal {
        operation: &'static str,
        object: ObjectRef,
        #[source]
        source: ApiError,
    },
}

/// Failures of one reconciliation, returned to the hosting control loop.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to read watched resource {object}: {source}")]
    Source {
        object: ObjectRef,
        #[source]
        source: ApiError,
    },

    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("failed to fetch artifact: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to list artifact content: {0}")]
    ReadEntries(#[source] std::io::Error),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("failed to apply target resource: {0}")]
    Apply(#[from] ApplyError),

    #[error("reconciliation cancelled")]
    Cancelled,
}
