use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of the model that produced a set of vectors.
///
/// Two vectors are only comparable when their metadata share a [`model_id`].
/// Persisted alongside the index so a restart under a different embedder is
/// detected instead of silently mixing vector spaces.
///
/// [`model_id`]: EmbeddingModelMetadata::model_id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelMetadata {
    /// Name of the embedding model (e.g., "all-MiniLM-L6-v2")
    pub model_name: String,
    /// Provider of the embedding model (e.g., "fastembed")
    pub provider: String,
    /// Dimension of the embedding vectors
    pub dimension: usize,
    /// Version/revision of the model
    pub model_version: Option<String>,
    /// Whether embeddings are normalized
    pub normalized: bool,
    /// Additional model-specific configuration
    pub config: BTreeMap<String, String>,
}

impl EmbeddingModelMetadata {
    pub fn new<S: Into<String>, P: Into<String>>(
        model_name: S,
        provider: P,
        dimension: usize,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            provider: provider.into(),
            dimension,
            model_version: None,
            normalized: false,
            config: BTreeMap::new(),
        }
    }

    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn with_config<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Create a unique identifier for this model configuration
    pub fn model_id(&self) -> String {
        let version_part = self.model_version.as_deref().unwrap_or("latest");
        let normalized_part = if self.normalized { "norm" } else { "raw" };
        format!(
            "{}:{}:{}:{}:{}",
            self.provider, self.model_name, version_part, self.dimension, normalized_part
        )
    }

    /// Whether vectors from `other` can share an index with vectors from `self`.
    pub fn is_compatible_with(&self, other: &EmbeddingModelMetadata) -> bool {
        self.model_id() == other.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_format() {
        let metadata = EmbeddingModelMetadata::new("all-MiniLM-L6-v2", "fastembed", 384)
            .with_normalized(true);
        assert_eq!(metadata.model_id(), "fastembed:all-MiniLM-L6-v2:latest:384:norm");

        let pinned = metadata.clone().with_version("v2");
        assert_eq!(pinned.model_id(), "fastembed:all-MiniLM-L6-v2:v2:384:norm");
        assert!(!metadata.is_compatible_with(&pinned));
    }

    #[test]
    fn test_dimension_change_is_incompatible() {
        let a = EmbeddingModelMetadata::new("text-embedding-004", "gemini", 768);
        let b = EmbeddingModelMetadata::new("text-embedding-004", "gemini", 256);
        assert!(!a.is_compatible_with(&b));
        assert!(a.is_compatible_with(&a.clone().with_config("task", "retrieval")));
    }
}
