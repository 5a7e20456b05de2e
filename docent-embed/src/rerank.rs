//! Cross-encoder reranking of retrieved passages

use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub const DEFAULT_RERANK_MODEL: &str = "bge-reranker-base";

/// Relevance of one candidate passage to a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankScore {
    /// Position of the passage in the candidate list
    pub index: usize,
    pub score: f32,
}

/// Scores query/passage pairs jointly, which is slower but sharper than
/// comparing independently computed vectors.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// Score every passage against `query`. The result holds one entry per
    /// passage, in no particular order.
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<RerankScore>>;

    fn provider_name(&self) -> &str;
}

pub fn builtin_reranker(name: &str) -> Result<RerankerModel> {
    match name.to_lowercase().as_str() {
        "bge-reranker-base" | "baai/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
        other => Err(EmbedError::invalid_config(format!(
            "unknown reranker model {other:?}"
        ))),
    }
}

/// FastEmbed cross-encoder run in-process
#[derive(Clone)]
pub struct FastEmbedReranker {
    model_name: String,
    model: Arc<Mutex<TextRerank>>,
}

impl std::fmt::Debug for FastEmbedReranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedReranker")
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl FastEmbedReranker {
    pub async fn create(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let builtin = builtin_reranker(model_name)?;
        let name = model_name.to_string();
        tracing::info!("Loading reranker model: {}", name);

        let model = tokio::task::spawn_blocking(move || -> Result<TextRerank> {
            let mut options = RerankInitOptions::new(builtin).with_show_download_progress(false);
            if let Some(dir) = cache_dir {
                options = options.with_cache_dir(dir);
            }
            TextRerank::try_new(options).map_err(|e| EmbedError::model_load(&name, e))
        })
        .await??;

        Ok(Self {
            model_name: model_name.to_string(),
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl RerankProvider for FastEmbedReranker {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<RerankScore>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let query = query.to_string();
        let passages = passages.to_vec();
        let model = Arc::clone(&self.model);

        let results = tokio::task::spawn_blocking(move || -> Result<Vec<RerankScore>> {
            let mut model = model
                .lock()
                .map_err(|_| EmbedError::embedding_gen("reranker lock poisoned"))?;
            let documents: Vec<&str> = passages.iter().map(String::as_str).collect();
            let ranked = model
                .rerank(query.as_str(), documents, false, None)
                .map_err(EmbedError::embedding_gen)?;
            Ok(ranked
                .into_iter()
                .map(|r| RerankScore {
                    index: r.index,
                    score: r.score,
                })
                .collect())
        })
        .await??;

        tracing::debug!("Reranked {} passages", results.len());
        Ok(results)
    }

    fn provider_name(&self) -> &str {
        "fastembed-rerank"
    }
}
