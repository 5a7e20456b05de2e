//! In-memory vector index with copy-on-write snapshots.
//!
//! Readers take the current [`Snapshot`] under a brief read lock and score it
//! with no lock held, so a search always sees one consistent version of the
//! index. Writers serialize on a separate mutex, build the next snapshot off to
//! the side, and hold the write lock only to swap the pointer. A failed write
//! leaves the published snapshot untouched.
//!
//! Search is exact: every entry is scored against the query.

use crate::entry::{IndexEntry, ScoredChunk};
use crate::error::{IndexError, Result};
use docent_context::{ContentHash, Document, reconstruct};
use docent_embed::EmbeddingModelMetadata;
use half::f16;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Similarity function, fixed for the lifetime of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Cosine,
    InnerProduct,
}

impl Metric {
    pub fn score(&self, a: &[f16], b: &[f16]) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (x, y) in a.iter().zip(b) {
            let (x, y) = (x.to_f32(), y.to_f32());
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }
        match self {
            Metric::InnerProduct => dot,
            Metric::Cosine => {
                let denom = norm_a.sqrt() * norm_b.sqrt();
                if denom > 0.0 { dot / denom } else { 0.0 }
            }
        }
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Metric::Cosine => 0,
            Metric::InnerProduct => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Metric::Cosine),
            1 => Some(Metric::InnerProduct),
            _ => None,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
            Metric::InnerProduct => write!(f, "inner_product"),
        }
    }
}

/// One immutable version of the index contents.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub model: EmbeddingModelMetadata,
    /// In insertion order
    pub entries: Vec<Arc<IndexEntry>>,
}

impl Snapshot {
    pub fn dimension(&self) -> usize {
        self.model.dimension
    }

    /// Distinct sources in first-insertion order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for entry in &self.entries {
            if seen.insert(entry.source.as_str()) {
                sources.push(entry.source.as_str());
            }
        }
        sources
    }

    /// Content hash of every source.
    pub fn source_hashes(&self) -> HashMap<&str, ContentHash> {
        let mut hashes = HashMap::new();
        for entry in &self.entries {
            hashes
                .entry(entry.source.as_str())
                .or_insert(entry.content_hash);
        }
        hashes
    }

    /// Reassemble the documents from their passages, in first-insertion order.
    pub fn documents(&self) -> Vec<Document> {
        let mut grouped: HashMap<&str, Vec<&IndexEntry>> = HashMap::new();
        for entry in &self.entries {
            grouped.entry(entry.source.as_str()).or_default().push(entry);
        }

        self.sources()
            .into_iter()
            .filter_map(|source| {
                let mut entries = grouped.remove(source)?;
                entries.sort_by_key(|e| e.sequence);
                let chunks: Vec<_> = entries.iter().map(|e| e.to_chunk()).collect();
                let ingested_at = entries.first()?.ingested_at;
                Some(Document::new(source, reconstruct(&chunks)).with_ingested_at(ingested_at))
            })
            .collect()
    }

    fn search(&self, metric: Metric, query: &[f16], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                score: metric.score(query, &entry.vector),
                entry: Arc::clone(entry),
                rerank_score: None,
            })
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}

/// Size and identity of an index, for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub entries: usize,
    pub documents: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub embedder: String,
}

/// The single owned vector index.
#[derive(Debug)]
pub struct VectorIndex {
    metric: Metric,
    current: RwLock<Arc<Snapshot>>,
    pub(crate) writer: Mutex<()>,
}

impl VectorIndex {
    /// An empty index for vectors produced by `model`.
    pub fn new(model: EmbeddingModelMetadata, metric: Metric) -> Self {
        Self::from_entries(model, metric, Vec::new())
    }

    pub(crate) fn from_entries(
        model: EmbeddingModelMetadata,
        metric: Metric,
        entries: Vec<IndexEntry>,
    ) -> Self {
        Self {
            metric,
            current: RwLock::new(Arc::new(Snapshot {
                model,
                entries: entries.into_iter().map(Arc::new).collect(),
            })),
            writer: Mutex::new(()),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The current contents. Later writes do not affect the returned snapshot.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn model(&self) -> EmbeddingModelMetadata {
        self.snapshot().await.model.clone()
    }

    pub async fn dimension(&self) -> usize {
        self.snapshot().await.dimension()
    }

    pub async fn len(&self) -> usize {
        self.snapshot().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshot().await.entries.is_empty()
    }

    pub async fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot().await;
        IndexStats {
            entries: snapshot.entries.len(),
            documents: snapshot.sources().len(),
            dimension: snapshot.dimension(),
            metric: self.metric,
            embedder: snapshot.model.model_id(),
        }
    }

    /// Append entries. Every entry is checked before any is added.
    ///
    /// # Errors
    /// [`IndexError::DimensionMismatch`] if any vector has the wrong length, in
    /// which case the index is unchanged.
    pub async fn insert(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let _writer = self.writer.lock().await;
        let current = self.snapshot().await;
        validate(&entries, current.dimension())?;

        let added = entries.len();
        let mut next = Vec::with_capacity(current.entries.len() + added);
        next.extend(current.entries.iter().cloned());
        next.extend(entries.into_iter().map(Arc::new));
        self.publish(current.model.clone(), next).await;

        tracing::debug!("Inserted {} entries", added);
        Ok(added)
    }

    /// Atomically drop every entry of `source` and append `entries` in their
    /// place. Returns how many entries were removed.
    pub async fn replace_source(&self, source: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let current = self.snapshot().await;
        validate(&entries, current.dimension())?;

        let mut next: Vec<Arc<IndexEntry>> = current
            .entries
            .iter()
            .filter(|e| e.source != source)
            .cloned()
            .collect();
        let removed = current.entries.len() - next.len();
        next.extend(entries.into_iter().map(Arc::new));
        self.publish(current.model.clone(), next).await;

        tracing::debug!("Replaced {} entries for {}", removed, source);
        Ok(removed)
    }

    /// Drop every entry of `source`, returning how many were removed.
    pub async fn remove_source(&self, source: &str) -> usize {
        let _writer = self.writer.lock().await;
        let current = self.snapshot().await;
        let next: Vec<Arc<IndexEntry>> = current
            .entries
            .iter()
            .filter(|e| e.source != source)
            .cloned()
            .collect();
        let removed = current.entries.len() - next.len();
        if removed > 0 {
            self.publish(current.model.clone(), next).await;
        }
        removed
    }

    /// Discard everything and install `entries`, possibly under a new model.
    pub async fn rebuild(
        &self,
        entries: Vec<IndexEntry>,
        model: EmbeddingModelMetadata,
    ) -> Result<()> {
        let writer = self.lock_writes().await;
        self.install(&writer, entries, model).await
    }

    /// Hold off every other writer until the guard is dropped.
    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Replace the contents while the caller holds the writer lock.
    pub(crate) async fn install(
        &self,
        _writer: &MutexGuard<'_, ()>,
        entries: Vec<IndexEntry>,
        model: EmbeddingModelMetadata,
    ) -> Result<()> {
        validate(&entries, model.dimension)?;
        let count = entries.len();
        self.publish(model, entries.into_iter().map(Arc::new).collect())
            .await;
        tracing::info!("Index rebuilt with {} entries", count);
        Ok(())
    }

    /// Hash of the document currently indexed under `source`, if any.
    pub async fn source_hash(&self, source: &str) -> Option<ContentHash> {
        self.snapshot()
            .await
            .entries
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.content_hash)
    }

    /// Whether this exact document version is already indexed.
    pub async fn contains_document(&self, source: &str, content_hash: &ContentHash) -> bool {
        self.source_hash(source).await.as_ref() == Some(content_hash)
    }

    /// Reassemble the indexed documents from their passages, in first-insertion
    /// order.
    pub async fn documents(&self) -> Vec<Document> {
        self.snapshot().await.documents()
    }

    /// The `k` entries most similar to `query`, best first. Equal scores keep
    /// insertion order.
    pub async fn search(&self, query: &[f16], k: usize) -> Result<Vec<ScoredChunk>> {
        let snapshot = self.snapshot().await;
        if query.len() != snapshot.dimension() {
            return Err(IndexError::DimensionMismatch {
                chunk_id: "<query>".to_string(),
                expected: snapshot.dimension(),
                actual: query.len(),
            });
        }
        if k == 0 || snapshot.entries.is_empty() {
            return Ok(Vec::new());
        }
        Ok(snapshot.search(self.metric, query, k))
    }

    async fn publish(&self, model: EmbeddingModelMetadata, entries: Vec<Arc<IndexEntry>>) {
        let next = Arc::new(Snapshot { model, entries });
        *self.current.write().await = next;
    }
}

fn validate(entries: &[IndexEntry], dimension: usize) -> Result<()> {
    for entry in entries {
        if entry.vector.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                chunk_id: entry.chunk_id.clone(),
                expected: dimension,
                actual: entry.vector.len(),
            });
        }
        if entry.vector.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::NonFiniteVector {
                chunk_id: entry.chunk_id.clone(),
            });
        }
    }
    Ok(())
}
