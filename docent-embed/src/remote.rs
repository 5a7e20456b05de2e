//! Hosted embeddings through the Gemini `batchEmbedContents` REST endpoint

use crate::config::{EmbedConfig, RemoteConfig};
use crate::error::{EmbedError, Result};
use crate::http::{self, RetryPolicy};
use crate::metadata::EmbeddingModelMetadata;
use crate::provider::{EmbeddingProvider, EmbeddingResult, to_f16};
use async_trait::async_trait;
use half::f16;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Largest batch the endpoint accepts in one request.
pub const MAX_REMOTE_BATCH: usize = 100;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

/// Embedding provider backed by the Gemini API.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    api_key: String,
    /// Fully qualified, e.g. `models/text-embedding-004`
    model_path: String,
    model_name: String,
    dimension: usize,
    requested_dimension: Option<usize>,
    batch_size: usize,
    normalize: bool,
    policy: RetryPolicy,
}

impl std::fmt::Debug for GeminiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiEmbedder")
            .field("endpoint", &self.endpoint)
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl GeminiEmbedder {
    /// Build the client. No request is made until the first embedding call.
    ///
    /// # Errors
    /// [`EmbedError::InvalidConfig`] when no API key is configured.
    pub fn new(config: &EmbedConfig, remote: &RemoteConfig) -> Result<Self> {
        config.validate()?;
        remote.validate()?;
        let api_key = remote.require_api_key()?.to_string();
        let client = http::build_client(remote.timeout())
            .map_err(|e| EmbedError::invalid_config(format!("cannot build HTTP client: {e}")))?;

        let model_name = config
            .model_name()
            .trim_start_matches("models/")
            .to_string();
        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1beta/models/{}:batchEmbedContents",
                remote.base_url(),
                model_name
            ),
            api_key,
            model_path: format!("models/{model_name}"),
            model_name,
            dimension: config.remote_dimension(),
            requested_dimension: config.dimension,
            batch_size: config.batch_size.min(MAX_REMOTE_BATCH),
            normalize: config.normalize,
            policy: remote.retry_policy(),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f16>>> {
        let request = BatchEmbedRequest {
            requests: batch
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.model_path,
                    content: Content {
                        parts: [Part { text }],
                    },
                    output_dimensionality: self.requested_dimension,
                })
                .collect(),
        };

        let response = http::send_with_retry(self.policy, "Gemini embeddings", || {
            self.client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
        })
        .await?;

        let body: BatchEmbedResponse = http::decode_json(response)
            .await
            .map_err(EmbedError::invalid_response)?;
        parse_embeddings(body, batch.len(), self.dimension, self.normalize)
    }
}

fn parse_embeddings(
    body: BatchEmbedResponse,
    expected_count: usize,
    dimension: usize,
    normalize: bool,
) -> Result<Vec<Vec<f16>>> {
    if body.embeddings.len() != expected_count {
        return Err(EmbedError::invalid_response(format!(
            "expected {expected_count} embeddings, got {}",
            body.embeddings.len()
        )));
    }
    body.embeddings
        .into_iter()
        .enumerate()
        .map(|(i, embedding)| {
            if embedding.values.len() != dimension {
                return Err(EmbedError::invalid_response(format!(
                    "embedding {i} has dimension {}, expected {dimension}",
                    embedding.values.len()
                )));
            }
            if embedding.values.iter().any(|v| !v.is_finite()) {
                return Err(EmbedError::invalid_response(format!(
                    "embedding {i} contains non-finite values"
                )));
            }
            Ok(to_f16(embedding.values, normalize))
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!("Requesting {} remote embeddings", batch.len());
            all_embeddings.extend(self.embed_batch(batch).await?);
        }
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_metadata(&self) -> EmbeddingModelMetadata {
        EmbeddingModelMetadata::new(&self.model_name, self.provider_name(), self.dimension)
            .with_normalized(self.normalize)
    }
}
