//! Query to ranked supporting passages

use crate::entry::RetrievalResult;
use crate::error::RetrieveError;
use crate::index::VectorIndex;
use docent_embed::{EmbeddingProvider, RerankProvider};
use std::sync::Arc;

/// How many extra candidates to hand the reranker per requested passage.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 3;

/// Embeds queries and looks them up in a shared [`VectorIndex`].
pub struct Retriever<E> {
    embedder: Arc<E>,
    index: Arc<VectorIndex>,
    reranker: Option<Arc<dyn RerankProvider>>,
    candidate_multiplier: usize,
}

impl<E> Clone for Retriever<E> {
    fn clone(&self) -> Self {
        Self {
            embedder: Arc::clone(&self.embedder),
            index: Arc::clone(&self.index),
            reranker: self.reranker.clone(),
            candidate_multiplier: self.candidate_multiplier,
        }
    }
}

impl<E: EmbeddingProvider> Retriever<E> {
    pub fn new(embedder: Arc<E>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            reranker: None,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
        }
    }

    /// Rescore the top `k × candidate_multiplier` similarity hits with a
    /// cross-encoder and keep the best `k`.
    pub fn with_reranker(mut self, reranker: Arc<dyn RerankProvider>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The (at most) `k` passages most relevant to `query`, best first.
    ///
    /// An empty index yields an empty result without calling the embedder.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RetrieveError> {
        if k == 0 || self.index.is_empty().await {
            return Ok(RetrievalResult::empty());
        }

        let vector = self.embedder.embed_text(query).await?;
        let candidates = match self.reranker {
            Some(_) => k.saturating_mul(self.candidate_multiplier),
            None => k,
        };
        let mut hits = self.index.search(&vector, candidates).await?;

        if let Some(reranker) = &self.reranker {
            if hits.len() > 1 {
                let passages: Vec<String> = hits.iter().map(|h| h.text().to_string()).collect();
                match reranker.rerank(query, &passages).await {
                    Ok(scores) => {
                        for score in scores {
                            if let Some(hit) = hits.get_mut(score.index) {
                                hit.rerank_score = Some(score.score);
                            }
                        }
                        // Stable sort: equal rerank scores keep similarity order.
                        hits.sort_by(|a, b| {
                            let a = a.rerank_score.unwrap_or(f32::NEG_INFINITY);
                            let b = b.rerank_score.unwrap_or(f32::NEG_INFINITY);
                            b.total_cmp(&a)
                        });
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Reranking with {} failed, keeping similarity order: {}",
                            reranker.provider_name(),
                            e
                        );
                    }
                }
            }
        }

        hits.truncate(k);
        tracing::debug!("Retrieved {} passages for query", hits.len());
        Ok(RetrievalResult::new(hits))
    }
}
