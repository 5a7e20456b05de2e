use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blake3 hash of a document's text (32 bytes).
pub type ContentHash = [u8; 32];

/// A loaded document: plain text plus where it came from.
///
/// The caller owns a `Document` until it is handed to ingestion; from then on
/// only the passages derived from it live on, inside the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Filename or URI identifying the document
    pub source: String,
    /// Extracted plain text
    pub text: String,
    /// When the document entered the system
    pub ingested_at: DateTime<Utc>,
    /// Blake3 hash of `text`
    pub content_hash: ContentHash,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            source: source.into(),
            content_hash: *blake3::hash(text.as_bytes()).as_bytes(),
            text,
            ingested_at: Utc::now(),
        }
    }

    pub fn with_ingested_at(mut self, ingested_at: DateTime<Utc>) -> Self {
        self.ingested_at = ingested_at;
        self
    }

    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
