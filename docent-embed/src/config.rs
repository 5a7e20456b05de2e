//! Configuration for embedding backends

use crate::error::{EmbedError, Result};
use crate::http::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default local model, small enough for a laptop CPU.
pub const DEFAULT_LOCAL_MODEL: &str = "all-MiniLM-L6-v2";

/// Default remote model.
pub const DEFAULT_REMOTE_MODEL: &str = "text-embedding-004";

/// Vector size requested from the remote model unless configured otherwise.
pub const DEFAULT_REMOTE_DIMENSION: usize = 768;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Which embedding implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// ONNX model in-process
    #[default]
    Local,
    /// Hosted API
    Remote,
}

impl std::fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingBackend::Local => write!(f, "local"),
            EmbeddingBackend::Remote => write!(f, "remote"),
        }
    }
}

/// Embedding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub backend: EmbeddingBackend,
    /// Model name; the backend's default when unset
    pub model: Option<String>,
    /// Where local model weights are cached
    pub cache_dir: Option<PathBuf>,
    /// Texts per embedding call
    pub batch_size: usize,
    /// Output dimensionality requested from the remote model
    pub dimension: Option<usize>,
    /// Scale every vector to unit length
    pub normalize: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Local,
            model: None,
            cache_dir: None,
            batch_size: 32,
            dimension: None,
            normalize: true,
        }
    }
}

impl EmbedConfig {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn remote() -> Self {
        Self {
            backend: EmbeddingBackend::Remote,
            ..Self::default()
        }
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_cache_dir<P: AsRef<Path>>(mut self, cache_dir: P) -> Self {
        self.cache_dir = Some(cache_dir.as_ref().to_path_buf());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// The configured model, or the backend's default.
    pub fn model_name(&self) -> &str {
        match (&self.model, self.backend) {
            (Some(model), _) => model,
            (None, EmbeddingBackend::Local) => DEFAULT_LOCAL_MODEL,
            (None, EmbeddingBackend::Remote) => DEFAULT_REMOTE_MODEL,
        }
    }

    /// Dimensionality requested from the remote model.
    pub fn remote_dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_REMOTE_DIMENSION)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        if self.model_name().trim().is_empty() {
            return Err(EmbedError::invalid_config("model name must not be empty"));
        }
        if self.dimension == Some(0) {
            return Err(EmbedError::invalid_config("dimension must be at least 1"));
        }
        Ok(())
    }
}

/// Connection settings shared by the hosted embedding and generation backends.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout_secs: 30,
            retries: 1,
            retry_backoff_ms: 500,
        }
    }
}

// Keeps the key out of logs.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("retries", &self.retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl RemoteConfig {
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_retry_backoff_ms(mut self, retry_backoff_ms: u64) -> Self {
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// The API key, which must be present and non-blank.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(EmbedError::invalid_config(
                "remote backend selected but no API key is configured (set GEMINI_API_KEY)",
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(EmbedError::invalid_config("timeout_secs must be at least 1"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(EmbedError::invalid_config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_defaults_follow_backend() {
        assert_eq!(EmbedConfig::local().model_name(), DEFAULT_LOCAL_MODEL);
        assert_eq!(EmbedConfig::remote().model_name(), DEFAULT_REMOTE_MODEL);
        assert_eq!(
            EmbedConfig::remote().with_model("embedding-001").model_name(),
            "embedding-001"
        );
        assert_eq!(EmbedConfig::remote().remote_dimension(), 768);
    }

    #[test]
    fn test_validation() {
        assert!(EmbedConfig::default().validate().is_ok());
        assert!(EmbedConfig::default().with_batch_size(0).validate().is_err());
        assert!(EmbedConfig::remote().with_dimension(0).validate().is_err());
        assert!(RemoteConfig::default().validate().is_ok());
        assert!(
            RemoteConfig::default()
                .with_base_url("ftp://example.com")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_api_key_required_and_redacted() {
        let config = RemoteConfig::default();
        assert!(matches!(
            config.require_api_key(),
            Err(EmbedError::InvalidConfig { .. })
        ));
        assert!(config.clone().with_api_key("   ").require_api_key().is_err());

        let config = config.with_api_key("secret-key");
        assert_eq!(config.require_api_key().unwrap(), "secret-key");
        assert!(!format!("{config:?}").contains("secret-key"));
    }

    #[test]
    fn test_backend_deserializes_lowercase() {
        let config: EmbedConfig = toml::from_str("backend = \"remote\"\nbatch_size = 8").unwrap();
        assert_eq!(config.backend, EmbeddingBackend::Remote);
        assert_eq!(config.batch_size, 8);
        assert!(config.normalize);
    }
}
