//! Index entries and retrieval results

use chrono::{DateTime, Utc};
use docent_context::{ContentHash, Document, TextChunk};
use half::f16;
use serde::Serialize;
use std::sync::Arc;

/// Build the stable identifier of a passage.
pub fn chunk_id(source: &str, sequence: usize) -> String {
    format!("{source}#{sequence}")
}

/// One embedded passage, owned by the index.
///
/// Entries are immutable once built; replacing a document swaps in new entries
/// rather than editing old ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    /// `<source>#<sequence>`
    pub chunk_id: String,
    /// Source identifier of the owning document
    pub source: String,
    /// Blake3 hash of the owning document's text
    #[serde(serialize_with = "serialize_hash")]
    pub content_hash: ContentHash,
    pub sequence: usize,
    /// Character offsets into the document text
    pub start: usize,
    pub end: usize,
    /// Characters shared with the previous passage
    pub overlap: usize,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
    #[serde(skip)]
    pub vector: Vec<f16>,
}

fn serialize_hash<S: serde::Serializer>(hash: &ContentHash, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode(hash))
}

impl IndexEntry {
    pub fn from_chunk(document: &Document, chunk: TextChunk, vector: Vec<f16>) -> Self {
        Self {
            chunk_id: chunk_id(&document.source, chunk.sequence),
            source: document.source.clone(),
            content_hash: document.content_hash,
            sequence: chunk.sequence,
            start: chunk.start,
            end: chunk.end,
            overlap: chunk.overlap,
            text: chunk.text,
            ingested_at: document.ingested_at,
            vector,
        }
    }

    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }

    /// The passage without its vector, as the chunker produced it.
    pub fn to_chunk(&self) -> TextChunk {
        TextChunk {
            sequence: self.sequence,
            start: self.start,
            end: self.end,
            overlap: self.overlap,
            text: self.text.clone(),
        }
    }
}

/// A passage paired with its relevance to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub entry: Arc<IndexEntry>,
    /// Vector similarity to the query
    pub score: f32,
    /// Cross-encoder relevance, when reranking ran
    pub rerank_score: Option<f32>,
}

impl ScoredChunk {
    pub fn chunk_id(&self) -> &str {
        &self.entry.chunk_id
    }

    pub fn source(&self) -> &str {
        &self.entry.source
    }

    pub fn text(&self) -> &str {
        &self.entry.text
    }
}

/// Passages ranked most relevant first.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.entry.chunk_id.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_from_chunk() {
        let document = Document::new("notes.md", "The sky is blue. Water is wet.");
        let chunk = document_chunk(&document);
        let entry = IndexEntry::from_chunk(&document, chunk.clone(), vec![f16::ONE]);

        assert_eq!(entry.chunk_id, "notes.md#1");
        assert_eq!(entry.content_hash, document.content_hash);
        assert_eq!(entry.to_chunk(), chunk);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["content_hash"], document.content_hash_hex());
        assert!(json.get("vector").is_none());
    }

    fn document_chunk(document: &Document) -> TextChunk {
        docent_context::split(&document.text, 20, 5)
            .unwrap()
            .remove(1)
    }
}
