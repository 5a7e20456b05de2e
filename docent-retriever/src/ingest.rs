//! Documents in, embedded passages out: chunk, embed, then insert.
//!
//! Embedding runs before any index lock is taken, so ingestion never blocks
//! searches for longer than a pointer swap.
//!
//! Re-ingesting a source is idempotent: the same source with the same content
//! hash is skipped, and a changed hash replaces the old passages atomically.
//!
//! A rebuild embeds from the snapshot it started with. Uploads and removals
//! published while it runs are carried into the result before it is swapped in.

use crate::entry::IndexEntry;
use crate::error::IngestError;
use crate::index::{Snapshot, VectorIndex};
use docent_context::{ChunkingConfig, Document, DocumentLoader, expand_path};
use docent_embed::EmbeddingProvider;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What ingesting one document did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// A new source; this many passages were added
    Added { chunks: usize },
    /// The same version was already indexed
    Unchanged,
    /// An older version was replaced
    Replaced { chunks: usize, removed: usize },
}

impl IngestOutcome {
    pub fn chunks_added(&self) -> usize {
        match self {
            IngestOutcome::Added { chunks } | IngestOutcome::Replaced { chunks, .. } => *chunks,
            IngestOutcome::Unchanged => 0,
        }
    }
}

/// Per-document result of a batch.
#[derive(Debug)]
pub struct IngestReport {
    pub source: String,
    pub result: Result<IngestOutcome, IngestError>,
}

impl IngestReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Totals for a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub documents: usize,
    pub chunks: usize,
}

pub struct IngestionPipeline<E> {
    embedder: Arc<E>,
    index: Arc<VectorIndex>,
    chunking: ChunkingConfig,
}

impl<E> Clone for IngestionPipeline<E> {
    fn clone(&self) -> Self {
        Self {
            embedder: Arc::clone(&self.embedder),
            index: Arc::clone(&self.index),
            chunking: self.chunking,
        }
    }
}

impl<E: EmbeddingProvider> IngestionPipeline<E> {
    /// # Errors
    /// [`IngestError::Chunk`] when the chunking parameters are invalid.
    pub fn new(
        embedder: Arc<E>,
        index: Arc<VectorIndex>,
        chunking: ChunkingConfig,
    ) -> Result<Self, IngestError> {
        chunking.validate()?;
        Ok(Self {
            embedder,
            index,
            chunking,
        })
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.chunking
    }

    /// Chunk and embed `document` without touching the index.
    pub async fn prepare(&self, document: &Document) -> Result<Vec<IndexEntry>, IngestError> {
        let chunks = self.chunking.split(&document.text)?;
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument {
                source_id: document.source.clone(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedded = self.embedder.embed_texts(&texts).await?;
        if embedded.len() != chunks.len() {
            return Err(IngestError::Embed(docent_embed::EmbedError::invalid_response(
                format!(
                    "expected {} embeddings, got {}",
                    chunks.len(),
                    embedded.len()
                ),
            )));
        }
        debug!(
            "Embedded {} passages of {} with {}",
            chunks.len(),
            document.source,
            self.embedder.provider_name()
        );

        Ok(chunks
            .into_iter()
            .zip(embedded.embeddings)
            .map(|(chunk, vector)| IndexEntry::from_chunk(document, chunk, vector))
            .collect())
    }

    /// Add one document to the index, applying the duplicate policy.
    pub async fn ingest(&self, document: &Document) -> Result<IngestOutcome, IngestError> {
        let previous = self.index.source_hash(&document.source).await;
        if previous.as_ref() == Some(&document.content_hash) {
            debug!("{} is unchanged, skipping", document.source);
            return Ok(IngestOutcome::Unchanged);
        }

        let entries = self.prepare(document).await?;
        let chunks = entries.len();
        let removed = self.index.replace_source(&document.source, entries).await?;

        let outcome = if removed == 0 {
            IngestOutcome::Added { chunks }
        } else {
            IngestOutcome::Replaced { chunks, removed }
        };
        info!("Ingested {}: {:?}", document.source, outcome);
        Ok(outcome)
    }

    /// Ingest each document in turn. A failing document is reported and logged;
    /// the rest are still ingested.
    pub async fn ingest_many(&self, documents: &[Document]) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(documents.len());
        for document in documents {
            let result = self.ingest(document).await;
            if let Err(e) = &result {
                error!("Failed to ingest {}: {}", document.source, e);
            }
            reports.push(IngestReport {
                source: document.source.clone(),
                result,
            });
        }
        reports
    }

    /// Load each file with `loader` and ingest it, reporting per file.
    /// Directories are expanded into the supported files below them.
    pub async fn ingest_files(
        &self,
        loader: &dyn DocumentLoader,
        paths: &[PathBuf],
    ) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            let files = expand_path(path);
            if path.is_dir() {
                info!("Found {} documents under {}", files.len(), path.display());
            }
            for file in files {
                let (source, result) = match file {
                    Ok(file) => {
                        let result = match loader.load_path_as(&file.path, &file.source_id) {
                            Ok(document) => self.ingest(&document).await,
                            Err(e) => Err(IngestError::Load(e)),
                        };
                        (file.path.display().to_string(), result)
                    }
                    Err(e) => (path.display().to_string(), Err(IngestError::Load(e))),
                };
                if let Err(e) = &result {
                    error!("Failed to ingest {}: {}", source, e);
                }
                reports.push(IngestReport { source, result });
            }
        }
        reports
    }

    /// Replace the whole index with `documents`, embedded from scratch.
    ///
    /// Every document is prepared before the swap; if any fails, the index is
    /// left exactly as it was. Writes that land while the documents are being
    /// embedded are kept.
    pub async fn rebuild(&self, documents: &[Document]) -> Result<RebuildSummary, IngestError> {
        let base = self.index.snapshot().await;
        self.rebuild_from(&base, documents).await
    }

    /// Re-embed every document currently in the index with this pipeline's
    /// embedder, e.g. after switching models.
    pub async fn reembed(&self) -> Result<RebuildSummary, IngestError> {
        let base = self.index.snapshot().await;
        let documents = base.documents();
        self.rebuild_from(&base, &documents).await
    }

    async fn rebuild_from(
        &self,
        base: &Arc<Snapshot>,
        documents: &[Document],
    ) -> Result<RebuildSummary, IngestError> {
        info!("Rebuilding index from {} documents", documents.len());
        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            prepared.push((document.source.clone(), self.prepare(document).await?));
        }

        let writer = self.index.lock_writes().await;
        let current = self.index.snapshot().await;
        if !Arc::ptr_eq(base, &current) {
            self.catch_up(base, &current, &mut prepared).await?;
        }

        let summary = RebuildSummary {
            documents: prepared.len(),
            chunks: prepared.iter().map(|(_, entries)| entries.len()).sum(),
        };
        let entries = prepared.into_iter().flat_map(|(_, entries)| entries).collect();
        self.index
            .install(&writer, entries, self.embedder.model_metadata())
            .await?;
        Ok(summary)
    }

    /// Apply to `prepared` every source change between `base` and `current`.
    /// Runs with the writer lock held, so `current` cannot move underneath it.
    async fn catch_up(
        &self,
        base: &Snapshot,
        current: &Snapshot,
        prepared: &mut Vec<(String, Vec<IndexEntry>)>,
    ) -> Result<(), IngestError> {
        let before = base.source_hashes();
        let after = current.source_hashes();

        prepared.retain(|(source, _)| {
            let removed =
                before.contains_key(source.as_str()) && !after.contains_key(source.as_str());
            if removed {
                debug!("{} was removed during the rebuild", source);
            }
            !removed
        });

        for document in current.documents() {
            let source = document.source.as_str();
            if before.get(source) == after.get(source) {
                continue;
            }
            warn!("{} changed during the rebuild, embedding it again", source);
            let entries = self.prepare(&document).await?;
            match prepared.iter_mut().find(|(s, _)| s == source) {
                Some(slot) => slot.1 = entries,
                None => prepared.push((document.source.clone(), entries)),
            }
        }
        Ok(())
    }
}
