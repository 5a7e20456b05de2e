//! Error types for the index, retrieval and ingestion

use docent_context::{ChunkError, LoadError};
use docent_embed::EmbedError;
use std::path::PathBuf;

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised by [`VectorIndex`](crate::index::VectorIndex) and its persistence.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A vector does not have the index's dimensionality; nothing was written
    #[error("Dimension mismatch for {chunk_id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },

    /// A vector contains NaN or infinite components
    #[error("Vector for {chunk_id} contains non-finite values")]
    NonFiniteVector { chunk_id: String },

    /// The persisted artifacts are incomplete or disagree with each other
    #[error("Corrupt index store at {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// The persisted vectors were produced by a different embedding model
    #[error("Index was built with embedder {stored}, but {configured} is configured; rebuild the index")]
    EmbedderMismatch { stored: String, configured: String },

    /// IO errors
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Database errors while writing the metadata artifact
    #[error("Database error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },
}

impl IndexError {
    pub fn corrupt<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable snake_case code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::DimensionMismatch { .. } => "dimension_mismatch",
            IndexError::NonFiniteVector { .. } => "invalid_vector",
            IndexError::CorruptStore { .. } => "corrupt_store",
            IndexError::EmbedderMismatch { .. } => "embedder_mismatch",
            IndexError::Io { .. } | IndexError::Database { .. } => "storage_error",
        }
    }
}

/// Errors raised while answering a retrieval request.
#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("Failed to embed query: {0}")]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl RetrieveError {
    pub fn code(&self) -> &'static str {
        match self {
            RetrieveError::Embed(e) => e.code(),
            RetrieveError::Index(e) => e.code(),
        }
    }
}

/// Why a single document could not be ingested.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("Failed to embed passages: {0}")]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Index(#[from] IndexError),

    /// The document produced no passages
    #[error("Document {source_id} contains no text")]
    EmptyDocument { source_id: String },
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Load(LoadError::UnsupportedFormat { .. }) => "unsupported_format",
            IngestError::Load(LoadError::Parse { .. }) => "parse_error",
            IngestError::Load(LoadError::Empty { .. }) | IngestError::EmptyDocument { .. } => {
                "empty_document"
            }
            IngestError::Load(LoadError::Io { .. }) => "storage_error",
            IngestError::Chunk(_) => "configuration_error",
            IngestError::Embed(e) => e.code(),
            IngestError::Index(e) => e.code(),
        }
    }
}
