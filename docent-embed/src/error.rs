//! Error types for the embedding system

use std::time::Duration;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// The first four variants are the backend taxonomy callers branch on; the rest
/// wrap lower-level failures the same way across providers.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The remote backend could not be reached, refused our credentials, or failed
    #[error("Embedding backend unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// The remote backend asked us to slow down (HTTP 429)
    #[error("Embedding backend rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The backend answered, but not with what we asked for
    #[error("Invalid embedding response: {message}")]
    InvalidResponse { message: String },

    /// Local model weights could not be loaded
    #[error("Failed to load embedding model {model}: {source}")]
    ModelLoad {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error when model configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs()),
        None => String::new(),
    }
}

impl EmbedError {
    /// Wrap a model loading failure.
    pub fn model_load<E>(model: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ModelLoad {
            model: model.into(),
            source: source.into(),
        }
    }

    /// Wrap a failure raised while computing embeddings.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Stable snake_case code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            EmbedError::UpstreamUnavailable { .. } => "upstream_unavailable",
            EmbedError::RateLimited { .. } => "rate_limited",
            EmbedError::InvalidResponse { .. } => "invalid_response",
            EmbedError::ModelLoad { .. } => "model_load_error",
            EmbedError::InvalidConfig { .. } => "configuration_error",
            EmbedError::EmbeddingGeneration { .. }
            | EmbedError::Io { .. }
            | EmbedError::AsyncTask { .. }
            | EmbedError::External { .. } => "embedding_failed",
        }
    }
}

impl From<crate::http::HttpFailure> for EmbedError {
    fn from(failure: crate::http::HttpFailure) -> Self {
        use crate::http::HttpFailure;
        match failure {
            HttpFailure::RateLimited { retry_after } => EmbedError::RateLimited { retry_after },
            HttpFailure::Unavailable { message } => EmbedError::UpstreamUnavailable { message },
            HttpFailure::Unauthorized { status } => EmbedError::UpstreamUnavailable {
                message: format!("credentials rejected (HTTP {status})"),
            },
            HttpFailure::Rejected { status, body } => EmbedError::UpstreamUnavailable {
                message: format!("request rejected with HTTP {status}: {body}"),
            },
        }
    }
}
