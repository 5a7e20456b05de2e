//! Embedding provider trait and the local FastEmbed implementation

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::metadata::EmbeddingModelMetadata;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result; the dimension is read from the first vector
    /// (0 when there are none).
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_response("no embedding generated for text"))
    }

    /// Generate embeddings for multiple texts, one vector per text, in order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Identity of the model behind this provider
    fn model_metadata(&self) -> EmbeddingModelMetadata;
}

/// Convert raw model output to half precision, optionally scaling to unit length.
pub fn to_f16(values: Vec<f32>, normalize: bool) -> Vec<f16> {
    let scale = if normalize {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 { 1.0 / norm } else { 1.0 }
    } else {
        1.0
    };
    values
        .into_iter()
        .map(|v| f16::from_f32(v * scale))
        .collect()
}

/// Map a configured model name to one of FastEmbed's bundled models.
pub fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok(EmbeddingModel::AllMiniLML6V2)
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "snowflake-arctic-embed-xs" => Ok(EmbeddingModel::SnowflakeArcticEmbedXS),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(EmbedError::invalid_config(format!(
            "unknown local embedding model {other:?}"
        ))),
    }
}

/// Type alias for cached model entries (model, dimension)
type ModelCacheEntry = (Arc<Mutex<TextEmbedding>>, usize);

/// Loaded models, shared by every provider created with the same settings
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// FastEmbed-based embedding provider running an ONNX model in-process
#[derive(Clone)]
pub struct FastEmbedProvider {
    model_name: String,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
    batch_size: usize,
    normalize: bool,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("batch_size", &self.batch_size)
            .field("normalize", &self.normalize)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Load the configured model, downloading weights into the cache directory
    /// on first use.
    ///
    /// # Errors
    /// [`EmbedError::ModelLoad`] when the weights cannot be fetched or loaded.
    pub async fn create(config: &EmbedConfig) -> Result<Self> {
        config.validate()?;
        let model_name = config.model_name().to_string();
        let builtin = builtin_model(&model_name)?;
        let cache_key = format!(
            "{}@{}",
            model_name,
            config
                .cache_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default()
        );

        let cached = {
            let cache = model_cache()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cache
                .get(&cache_key)
                .map(|(model, dim)| (Arc::clone(model), *dim))
        };

        let (model, dimension) = match cached {
            Some(entry) => {
                tracing::info!("Using cached embedding model: {}", model_name);
                entry
            }
            None => {
                tracing::info!("Loading embedding model: {}", model_name);
                let cache_dir = config.cache_dir.clone();
                let name = model_name.clone();
                let (model, dimension) =
                    tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                        let mut options =
                            InitOptions::new(builtin).with_show_download_progress(false);
                        if let Some(dir) = cache_dir {
                            options = options.with_cache_dir(dir);
                        }
                        let mut model = TextEmbedding::try_new(options)
                            .map_err(|e| EmbedError::model_load(&name, e))?;

                        // Probe once to learn the dimension and prove the model runs.
                        let probe = model
                            .embed(vec!["dimension probe".to_string()], None)
                            .map_err(|e| EmbedError::model_load(&name, e))?;
                        let dimension = probe.first().map(Vec::len).unwrap_or(0);
                        if dimension == 0 {
                            return Err(EmbedError::model_load(
                                &name,
                                "model produced an empty embedding",
                            ));
                        }
                        Ok((model, dimension))
                    })
                    .await??;

                let model = Arc::new(Mutex::new(model));
                model_cache()
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .insert(cache_key, (Arc::clone(&model), dimension));
                tracing::info!(
                    "Embedding model {} loaded. Dimension: {}",
                    model_name,
                    dimension
                );
                (model, dimension)
            }
        };

        Ok(Self {
            model_name,
            model,
            dimension,
            batch_size: config.batch_size,
            normalize: config.normalize,
        })
    }

    /// Drop every cached model.
    pub fn clear_cache() {
        model_cache()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        tracing::info!("Model cache cleared");
    }

    pub fn cache_size() -> usize {
        model_cache()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let raw = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model = model
                    .lock()
                    .map_err(|_| EmbedError::embedding_gen("embedding model lock poisoned"))?;
                model.embed(batch, None).map_err(EmbedError::embedding_gen)
            })
            .await??;

            all_embeddings.extend(raw.into_iter().map(|v| to_f16(v, self.normalize)));
        }

        if all_embeddings.len() != texts.len() {
            return Err(EmbedError::invalid_response(format!(
                "expected {} embeddings, model returned {}",
                texts.len(),
                all_embeddings.len()
            )));
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_metadata(&self) -> EmbeddingModelMetadata {
        EmbeddingModelMetadata::new(&self.model_name, self.provider_name(), self.dimension)
            .with_normalized(self.normalize)
    }
}
