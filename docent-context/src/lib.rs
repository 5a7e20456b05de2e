//! # docent-context
//!
//! Turns documents into retrieval passages: the [`loader`] boundary that produces
//! plain text and the [`text`] chunker that cuts it into fixed-size, overlapping
//! passages.

pub mod document;
pub mod error;
pub mod loader;
pub mod text;

pub use document::{ContentHash, Document};
pub use error::{ChunkError, LoadError};
pub use loader::{
    DocumentFormat, DocumentLoader, SourceFile, TextLoader, expand_path, normalize_whitespace,
};
pub use text::{ChunkingConfig, TextChunk, reconstruct, split};
