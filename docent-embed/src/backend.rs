//! The embedding backend chosen at startup

use crate::config::{EmbedConfig, EmbeddingBackend, RemoteConfig};
use crate::error::Result;
use crate::metadata::EmbeddingModelMetadata;
use crate::provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
use crate::remote::GeminiEmbedder;
use async_trait::async_trait;
use half::f16;

/// One of the bundled embedding providers, selected once from configuration.
#[derive(Debug, Clone)]
pub enum Embedder {
    Remote(GeminiEmbedder),
    Local(FastEmbedProvider),
}

impl Embedder {
    /// Construct the configured backend. Local models are loaded here, so a
    /// missing model fails at startup rather than on the first document.
    pub async fn from_config(config: &EmbedConfig, remote: &RemoteConfig) -> Result<Self> {
        let embedder = match config.backend {
            EmbeddingBackend::Remote => Embedder::Remote(GeminiEmbedder::new(config, remote)?),
            EmbeddingBackend::Local => Embedder::Local(FastEmbedProvider::create(config).await?),
        };
        tracing::info!(
            "Embedding backend ready: {} ({})",
            embedder.provider_name(),
            embedder.model_metadata().model_id()
        );
        Ok(embedder)
    }

    pub fn backend(&self) -> EmbeddingBackend {
        match self {
            Embedder::Remote(_) => EmbeddingBackend::Remote,
            Embedder::Local(_) => EmbeddingBackend::Local,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        match self {
            Embedder::Remote(p) => p.embed_text(text).await,
            Embedder::Local(p) => p.embed_text(text).await,
        }
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        match self {
            Embedder::Remote(p) => p.embed_texts(texts).await,
            Embedder::Local(p) => p.embed_texts(texts).await,
        }
    }

    fn embedding_dimension(&self) -> usize {
        match self {
            Embedder::Remote(p) => p.embedding_dimension(),
            Embedder::Local(p) => p.embedding_dimension(),
        }
    }

    fn provider_name(&self) -> &str {
        match self {
            Embedder::Remote(p) => p.provider_name(),
            Embedder::Local(p) => p.provider_name(),
        }
    }

    fn model_metadata(&self) -> EmbeddingModelMetadata {
        match self {
            Embedder::Remote(p) => p.model_metadata(),
            Embedder::Local(p) => p.model_metadata(),
        }
    }
}
