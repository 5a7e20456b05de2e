//! # docent-embed
//!
//! Text embeddings for retrieval, from either a local ONNX model run through
//! FastEmbed or the hosted Gemini API. Both sit behind [`EmbeddingProvider`];
//! the [`Embedder`] enum picks one at startup from [`EmbedConfig`].
//!
//! ```no_run
//! use docent_embed::{EmbedConfig, Embedder, EmbeddingProvider, RemoteConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let embedder = Embedder::from_config(&EmbedConfig::local(), &RemoteConfig::default()).await?;
//!
//! let texts = vec!["The sky is blue.".to_string(), "Water is wet.".to_string()];
//! let result = embedder.embed_texts(&texts).await?;
//! println!("{} vectors of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! Vectors are half precision ([`half::f16`]) and unit length unless
//! normalization is turned off. [`EmbeddingModelMetadata::model_id`] identifies the
//! vector space a provider produces; indexes store it to refuse mixing spaces.
//!
//! Remote calls share the timeout and single-retry behaviour in [`http`].

pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod metadata;
pub mod provider;
pub mod remote;
pub mod rerank;

pub use backend::Embedder;
pub use config::{EmbedConfig, EmbeddingBackend, RemoteConfig};
pub use error::{EmbedError, Result};
pub use metadata::EmbeddingModelMetadata;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
pub use remote::GeminiEmbedder;
pub use rerank::{FastEmbedReranker, RerankProvider, RerankScore};

pub use half::f16;
