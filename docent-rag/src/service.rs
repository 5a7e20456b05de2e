//! The assembled question-answering service.
//!
//! [`RagService`] owns the single vector index for the process. It is opened
//! from disk at startup and flushed with [`RagService::save`] at shutdown; in
//! between, questions and uploads can run concurrently on a shared reference.

use crate::answer::{Answer, AnswerGenerator};
use crate::config::RagConfig;
use crate::error::RagError;
use crate::generate::{GenerationBackend, Generator};
use docent_context::{ChunkingConfig, Document, DocumentFormat, DocumentLoader, TextLoader};
use docent_embed::{Embedder, EmbeddingProvider, FastEmbedReranker, RerankProvider};
use docent_retriever::{
    IndexStats, IngestOutcome, IngestReport, IngestionPipeline, Metric, RebuildSummary,
    RetrievalResult, Retriever, VectorIndex,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub source: String,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
    /// Passages in the index afterwards
    pub index_entries: usize,
}

/// Snapshot of the service for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub index_path: PathBuf,
    pub entries: usize,
    pub documents: usize,
    pub dimension: usize,
    pub metric: Metric,
    /// Fingerprint of the vector space, see `EmbeddingModelMetadata::model_id`
    pub embedder: String,
    pub embedding_backend: String,
    /// Backend that would answer a question right now; `None` when the service
    /// was started for indexing only
    pub generator: Option<String>,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub rerank: bool,
}

impl StatusReport {
    fn new(
        config: &RagConfig,
        stats: IndexStats,
        embedding_backend: String,
        generator: Option<String>,
    ) -> Self {
        Self {
            index_path: config.index.path.clone(),
            entries: stats.entries,
            documents: stats.documents,
            dimension: stats.dimension,
            metric: stats.metric,
            embedder: stats.embedder,
            embedding_backend,
            generator,
            chunking: config.chunking,
            top_k: config.retrieval.top_k,
            rerank: config.retrieval.rerank,
        }
    }
}

pub struct RagService<E = Embedder, G = Generator> {
    config: RagConfig,
    embedder: Arc<E>,
    index: Arc<VectorIndex>,
    pipeline: IngestionPipeline<E>,
    retriever: Retriever<E>,
    answers: Option<AnswerGenerator<G>>,
    loader: TextLoader,
}

impl RagService {
    /// Start everything the configuration selects: embedder, stored index,
    /// generation backend and (optionally) the reranker.
    ///
    /// # Errors
    /// [`RagError::Configuration`] for invalid settings, and the embedder, index
    /// or generator error that stopped startup otherwise. A stored index built
    /// with a different embedder yields `embedder_mismatch`; run
    /// [`RagService::start_reembedding`] to convert it.
    pub async fn start(config: RagConfig) -> Result<Self, RagError> {
        Self::start_with(config, true).await
    }

    /// Like [`RagService::start`] but without a generation backend, for
    /// ingestion and maintenance commands.
    pub async fn start_indexing(config: RagConfig) -> Result<Self, RagError> {
        Self::start_with(config, false).await
    }

    /// Open whatever index is stored, whichever embedder built it, and
    /// re-embed all of its documents with the configured embedder.
    pub async fn start_reembedding(config: RagConfig) -> Result<(Self, RebuildSummary), RagError> {
        config.validate()?;
        let embedder = Arc::new(Embedder::from_config(&config.embedding, &config.remote).await?);
        let index = match VectorIndex::load(&config.index.path, config.index.metric).await? {
            Some(index) => index,
            None => VectorIndex::new(embedder.model_metadata(), config.index.metric),
        };
        let service = Self::from_parts(config, embedder, Arc::new(index), None, None)?;
        let summary = service.rebuild().await?;
        Ok((service, summary))
    }

    /// Status of the stored index, read without starting any backend. Works
    /// whichever embedder built the index.
    pub async fn stored_status(config: &RagConfig) -> Result<StatusReport, RagError> {
        let stats = match VectorIndex::load(&config.index.path, config.index.metric).await? {
            Some(index) => index.stats().await,
            None => IndexStats {
                entries: 0,
                documents: 0,
                dimension: 0,
                metric: config.index.metric,
                embedder: "none".to_string(),
            },
        };
        Ok(StatusReport::new(
            config,
            stats,
            config.embedding.backend.to_string(),
            Some(format!("{} (configured)", config.generation.backend)),
        ))
    }

    async fn start_with(config: RagConfig, with_generator: bool) -> Result<Self, RagError> {
        config.validate()?;
        info!(
            "Starting docent with index at {}",
            config.index.path.display()
        );

        let embedder = Arc::new(Embedder::from_config(&config.embedding, &config.remote).await?);
        let index = VectorIndex::open(
            &config.index.path,
            &embedder.model_metadata(),
            config.index.metric,
        )
        .await?;

        let generator = if with_generator {
            Some(Arc::new(
                Generator::from_config(&config.generation, &config.remote).await?,
            ))
        } else {
            None
        };

        let reranker: Option<Arc<dyn RerankProvider>> = if config.retrieval.rerank {
            let reranker = FastEmbedReranker::create(
                &config.retrieval.rerank_model,
                config.embedding.cache_dir.clone(),
            )
            .await?;
            Some(Arc::new(reranker) as Arc<dyn RerankProvider>)
        } else {
            None
        };

        Self::from_parts(config, embedder, Arc::new(index), generator, reranker)
    }
}

impl<E: EmbeddingProvider, G: GenerationBackend> RagService<E, G> {
    /// Assemble a service from already constructed parts.
    pub fn from_parts(
        config: RagConfig,
        embedder: Arc<E>,
        index: Arc<VectorIndex>,
        generator: Option<Arc<G>>,
        reranker: Option<Arc<dyn RerankProvider>>,
    ) -> Result<Self, RagError> {
        let pipeline =
            IngestionPipeline::new(Arc::clone(&embedder), Arc::clone(&index), config.chunking)?;

        let mut retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&index))
            .with_candidate_multiplier(config.retrieval.candidate_multiplier);
        if let Some(reranker) = reranker {
            retriever = retriever.with_reranker(reranker);
        }

        let answers = generator
            .map(|backend| AnswerGenerator::new(backend, config.generation.max_context_chars));

        Ok(Self {
            config,
            embedder,
            index,
            pipeline,
            retriever,
            answers,
            loader: TextLoader,
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Answer `question` from the configured number of passages.
    pub async fn query(&self, question: &str) -> Result<Answer, RagError> {
        self.query_with_k(question, self.config.retrieval.top_k)
            .await
    }

    pub async fn query_with_k(&self, question: &str, k: usize) -> Result<Answer, RagError> {
        let answers = self.answers.as_ref().ok_or_else(|| {
            RagError::configuration("the service was started without a generation backend")
        })?;
        let result = self.retrieve(question, k).await?;
        Ok(answers.generate(question, &result).await?)
    }

    /// The passages `query` would answer from, without generating anything.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::invalid_request("question must not be empty"));
        }
        if k == 0 {
            return Err(RagError::invalid_request("top_k must be at least 1"));
        }
        Ok(self.retriever.retrieve(question, k).await?)
    }

    /// Add or update one document.
    pub async fn upload(&self, document: Document) -> Result<IngestSummary, RagError> {
        let outcome = self.pipeline.ingest(&document).await?;
        Ok(IngestSummary {
            source: document.source,
            outcome,
            index_entries: self.index.len().await,
        })
    }

    /// Extract text from raw upload bytes, then [`upload`](Self::upload) it.
    pub async fn upload_bytes(
        &self,
        source_id: &str,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<IngestSummary, RagError> {
        let document = self
            .loader
            .load(source_id, bytes, format)
            .map_err(docent_retriever::IngestError::from)?;
        self.upload(document).await
    }

    /// Bulk ingestion; a failing document does not stop the rest.
    pub async fn ingest_documents(&self, documents: &[Document]) -> Vec<IngestReport> {
        self.pipeline.ingest_many(documents).await
    }

    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> Vec<IngestReport> {
        self.pipeline.ingest_files(&self.loader, paths).await
    }

    /// Re-embed every stored document and swap the result in atomically.
    pub async fn rebuild(&self) -> Result<RebuildSummary, RagError> {
        let summary = self.pipeline.reembed().await?;
        info!(
            "Rebuilt index: {} documents, {} passages",
            summary.documents, summary.chunks
        );
        Ok(summary)
    }

    pub async fn status(&self) -> StatusReport {
        StatusReport::new(
            &self.config,
            self.index.stats().await,
            self.embedder.provider_name().to_string(),
            self.answers
                .as_ref()
                .map(|answers| answers.backend().active_backend()),
        )
    }

    /// Flush the index to its configured location.
    pub async fn save(&self) -> Result<(), RagError> {
        self.index.save(&self.config.index.path).await?;
        Ok(())
    }

    /// Save and drop the service.
    pub async fn shutdown(self) -> Result<(), RagError> {
        if let Err(e) = self.save().await {
            warn!("Failed to save index at shutdown: {}", e);
            return Err(e);
        }
        info!("Index saved to {}", self.config.index.path.display());
        Ok(())
    }
}
