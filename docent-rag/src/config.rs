//! Process configuration: a TOML file plus environment overrides.
//!
//! ```toml
//! [index]
//! path = "docent-data/index"
//! metric = "cosine"
//!
//! [chunking]
//! max_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! top_k = 4
//! rerank = false
//!
//! [embedding]
//! backend = "local"
//!
//! [generation]
//! backend = "remote"
//! failover = true
//! local_model = "llama3.2:1b"
//!
//! [remote]
//! # api_key is usually taken from GEMINI_API_KEY
//! ```

use crate::error::RagError;
use docent_context::ChunkingConfig;
use docent_embed::rerank::DEFAULT_RERANK_MODEL;
use docent_embed::{EmbedConfig, EmbeddingBackend, RemoteConfig};
use docent_retriever::{DEFAULT_CANDIDATE_MULTIPLIER, Metric};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INDEX_PATH: &str = "docent-data/index";
pub const DEFAULT_REMOTE_GENERATION_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_LOCAL_GENERATION_MODEL: &str = "llama3.2:1b";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

/// Which generation implementation answers questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackendKind {
    /// Locally served model
    #[default]
    Local,
    /// Hosted API
    Remote,
}

impl std::fmt::Display for GenerationBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationBackendKind::Local => write!(f, "local"),
            GenerationBackendKind::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base path of the `.vectors` / `.meta.db` pair
    pub path: PathBuf,
    pub metric: Metric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_INDEX_PATH),
            metric: Metric::Cosine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Passages handed to the generator per question
    pub top_k: usize,
    /// Rescore candidates with a cross-encoder
    pub rerank: bool,
    pub rerank_model: String,
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            rerank: false,
            rerank_model: DEFAULT_RERANK_MODEL.to_string(),
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub backend: GenerationBackendKind,
    /// Fall back to the local model while the remote one is failing
    pub failover: bool,
    pub failover_cooldown_secs: u64,
    /// Remote model name
    pub model: Option<String>,
    /// Local model name, also the failover target
    pub local_model: Option<String>,
    /// Base URL of the local model server
    pub endpoint: String,
    /// Budget for the passages placed in one prompt
    pub max_context_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Local models can be slow on CPU
    pub local_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackendKind::Local,
            failover: false,
            failover_cooldown_secs: 300,
            model: None,
            local_model: None,
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            max_context_chars: 8000,
            max_tokens: 512,
            temperature: 0.2,
            local_timeout_secs: 120,
        }
    }
}

impl GenerationConfig {
    pub fn remote_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or(DEFAULT_REMOTE_GENERATION_MODEL)
    }

    pub fn local_model(&self) -> &str {
        self.local_model
            .as_deref()
            .unwrap_or(DEFAULT_LOCAL_GENERATION_MODEL)
    }

    pub fn failover_cooldown(&self) -> Duration {
        Duration::from_secs(self.failover_cooldown_secs)
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_secs(self.local_timeout_secs)
    }
}

/// Everything the service needs at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbedConfig,
    pub generation: GenerationConfig,
    pub remote: RemoteConfig,
}

impl RagConfig {
    /// Read `path` (if any), apply environment overrides and validate.
    ///
    /// # Errors
    /// [`RagError::Configuration`] for unreadable files, bad TOML, unparsable
    /// overrides or invalid settings.
    pub fn load(path: Option<&Path>) -> Result<Self, RagError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RagError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
            .map_err(|e| RagError::configuration(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self, RagError> {
        toml::from_str(text).map_err(|e| RagError::configuration(e.to_string()))
    }

    /// Apply `DOCENT_*` and `GEMINI_API_KEY` overrides read through `var`.
    pub fn apply_env_overrides<F>(&mut self, var: F) -> Result<(), RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("GEMINI_API_KEY") {
            self.remote.api_key = Some(key);
        }
        // USE_GEMINI=true selects the remote variant of both backends.
        if let Some(value) = var("USE_GEMINI") {
            if parse_env::<bool>("USE_GEMINI", &value.to_lowercase())? {
                self.embedding.backend = EmbeddingBackend::Remote;
                self.generation.backend = GenerationBackendKind::Remote;
            }
        }
        if let Some(path) = var("DOCENT_INDEX_PATH") {
            self.index.path = PathBuf::from(path);
        }
        if let Some(value) = var("DOCENT_EMBEDDING_BACKEND") {
            self.embedding.backend = match value.to_lowercase().as_str() {
                "local" => EmbeddingBackend::Local,
                "remote" => EmbeddingBackend::Remote,
                other => return Err(bad_env("DOCENT_EMBEDDING_BACKEND", other)),
            };
        }
        if let Some(model) = var("DOCENT_EMBEDDING_MODEL") {
            self.embedding.model = Some(model);
        }
        if let Some(value) = var("DOCENT_GENERATION_BACKEND") {
            self.generation.backend = match value.to_lowercase().as_str() {
                "local" => GenerationBackendKind::Local,
                "remote" => GenerationBackendKind::Remote,
                other => return Err(bad_env("DOCENT_GENERATION_BACKEND", other)),
            };
        }
        if let Some(model) = var("DOCENT_GENERATION_MODEL") {
            self.generation.model = Some(model);
        }
        if let Some(model) = var("DOCENT_LOCAL_MODEL") {
            self.generation.local_model = Some(model);
        }
        if let Some(endpoint) = var("DOCENT_OLLAMA_ENDPOINT") {
            self.generation.endpoint = endpoint;
        }
        if let Some(value) = var("DOCENT_FAILOVER") {
            self.generation.failover = parse_env("DOCENT_FAILOVER", &value.to_lowercase())?;
        }
        if let Some(value) = var("DOCENT_TOP_K") {
            self.retrieval.top_k = parse_env("DOCENT_TOP_K", &value)?;
        }
        if let Some(value) = var("DOCENT_CHUNK_SIZE") {
            self.chunking.max_size = parse_env("DOCENT_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = var("DOCENT_CHUNK_OVERLAP") {
            self.chunking.overlap = parse_env("DOCENT_CHUNK_OVERLAP", &value)?;
        }
        Ok(())
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> Result<(), RagError> {
        self.chunking.validate()?;
        self.embedding
            .validate()
            .map_err(|e| RagError::configuration(e.to_string()))?;
        self.remote
            .validate()
            .map_err(|e| RagError::configuration(e.to_string()))?;

        if self.retrieval.top_k == 0 {
            return Err(RagError::configuration("retrieval.top_k must be at least 1"));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(RagError::configuration(
                "retrieval.candidate_multiplier must be at least 1",
            ));
        }
        if self.generation.max_context_chars == 0 {
            return Err(RagError::configuration(
                "generation.max_context_chars must be at least 1",
            ));
        }
        if self.generation.max_tokens == 0 {
            return Err(RagError::configuration("generation.max_tokens must be at least 1"));
        }
        if self.generation.local_timeout_secs == 0 {
            return Err(RagError::configuration(
                "generation.local_timeout_secs must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::configuration(
                "generation.temperature must be between 0 and 2",
            ));
        }
        if self.generation.failover && self.generation.backend != GenerationBackendKind::Remote {
            return Err(RagError::configuration(
                "generation.failover requires the remote generation backend",
            ));
        }
        if self.index.path.as_os_str().is_empty() {
            return Err(RagError::configuration("index.path must not be empty"));
        }

        let remote_selected = self.embedding.backend == EmbeddingBackend::Remote
            || self.generation.backend == GenerationBackendKind::Remote;
        if remote_selected {
            self.remote
                .require_api_key()
                .map_err(|e| RagError::configuration(e.to_string()))?;
        }
        Ok(())
    }

    pub fn with_index_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.index.path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.retrieval.top_k = top_k;
        self
    }

    pub fn with_embedding(mut self, embedding: EmbedConfig) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = remote;
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, RagError> {
    value.trim().parse().map_err(|_| bad_env(name, value))
}

fn bad_env(name: &str, value: &str) -> RagError {
    RagError::configuration(format!("cannot parse {name}={value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_local_and_valid() {
        let config = RagConfig::default();
        assert_eq!(config.embedding.backend, EmbeddingBackend::Local);
        assert_eq!(config.generation.backend, GenerationBackendKind::Local);
        assert_eq!(config.retrieval.top_k, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parses_toml_sections() {
        let config = RagConfig::from_toml(
            r#"
            [index]
            path = "/var/lib/docent/index"
            metric = "inner_product"

            [chunking]
            max_size = 500
            overlap = 50

            [retrieval]
            top_k = 6
            rerank = true

            [generation]
            backend = "remote"
            failover = true
            failover_cooldown_secs = 60

            [remote]
            api_key = "k"
            timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.index.metric, Metric::InnerProduct);
        assert_eq!(config.chunking.max_size, 500);
        assert_eq!(config.retrieval.top_k, 6);
        assert!(config.retrieval.rerank);
        assert_eq!(config.retrieval.candidate_multiplier, 3);
        assert_eq!(config.generation.failover_cooldown(), Duration::from_secs(60));
        assert_eq!(config.generation.remote_model(), DEFAULT_REMOTE_GENERATION_MODEL);
        assert_eq!(config.remote.timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_is_a_configuration_error() {
        let err = RagConfig::from_toml("[generation]\nbackend = \"cloud\"").unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[test]
    fn test_remote_backend_requires_api_key() {
        let mut config = RagConfig::default();
        config.generation.backend = GenerationBackendKind::Remote;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        config
            .apply_env_overrides(env(&[("GEMINI_API_KEY", "secret")]))
            .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_chunking_is_fatal() {
        let config = RagConfig::default()
            .with_chunking(ChunkingConfig::default().with_max_size(100).with_overlap(100));
        assert!(matches!(
            config.validate(),
            Err(RagError::Configuration { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RagConfig::default();
        config
            .apply_env_overrides(env(&[
                ("DOCENT_INDEX_PATH", "/tmp/idx"),
                ("DOCENT_TOP_K", "7"),
                ("DOCENT_CHUNK_SIZE", "300"),
                ("DOCENT_CHUNK_OVERLAP", "30"),
                ("DOCENT_LOCAL_MODEL", "phi3"),
                ("USE_GEMINI", "TRUE"),
            ]))
            .unwrap();
        assert_eq!(config.index.path, PathBuf::from("/tmp/idx"));
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.chunking, ChunkingConfig::new(300, 30).unwrap());
        assert_eq!(config.generation.local_model(), "phi3");
        assert_eq!(config.embedding.backend, EmbeddingBackend::Remote);
        assert_eq!(config.generation.backend, GenerationBackendKind::Remote);

        let err = config
            .apply_env_overrides(env(&[("DOCENT_TOP_K", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("DOCENT_TOP_K"));
    }

    #[test]
    fn test_failover_needs_remote_backend() {
        let mut config = RagConfig::default();
        config.generation.failover = true;
        assert!(config.validate().is_err());
    }
}
