//! Error types for chunking and document loading

use std::path::PathBuf;

/// Result type for chunking operations.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// Errors raised by the chunker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// The size/overlap pair cannot produce well-formed passages
    #[error("Invalid chunk parameters (max_size={max_size}, overlap={overlap}): {reason}")]
    InvalidParameters {
        max_size: usize,
        overlap: usize,
        reason: &'static str,
    },
}

/// Errors raised while turning a file into plain text.
///
/// These are per-document failures: a batch of many documents reports them
/// individually and carries on with the rest.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The declared or inferred format is not one the loader can read
    #[error("Unsupported document format: {format}")]
    UnsupportedFormat { format: String },

    /// The bytes could not be interpreted as the declared format
    #[error("Failed to parse {source_id}: {message}")]
    Parse { source_id: String, message: String },

    /// The document contained no readable text after extraction
    #[error("Document {source_id} contains no readable text")]
    Empty { source_id: String },

    /// IO errors while reading the file
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub fn parse<S: Into<String>, M: Into<String>>(source_id: S, message: M) -> Self {
        Self::Parse {
            source_id: source_id.into(),
            message: message.into(),
        }
    }
}
