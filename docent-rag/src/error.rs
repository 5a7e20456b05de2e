//! Error taxonomy for the question-answering service

use docent_context::ChunkError;
use docent_embed::EmbedError;
use docent_embed::http::HttpFailure;
use docent_retriever::{IndexError, IngestError, RetrieveError};
use std::time::Duration;

/// Errors raised by generation backends.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Generation backend unavailable: {message}")]
    UpstreamUnavailable { message: String },

    #[error("Generation backend rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Invalid generation response: {message}")]
    InvalidResponse { message: String },

    /// The local model is not installed or could not be started
    #[error("Failed to load generation model {model}: {message}")]
    ModelLoad { model: String, message: String },

    /// The local model ran out of memory while answering
    #[error("Generation model ran out of memory: {message}")]
    OutOfMemory { message: String },

    #[error("Invalid generation configuration: {message}")]
    InvalidConfig { message: String },
}

impl GenerateError {
    pub fn invalid_response<S: Into<String>>(message: S) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GenerateError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GenerateError::RateLimited { .. } => "rate_limited",
            GenerateError::InvalidResponse { .. } => "invalid_response",
            GenerateError::ModelLoad { .. } => "model_load_error",
            GenerateError::OutOfMemory { .. } => "out_of_memory",
            GenerateError::InvalidConfig { .. } => "configuration_error",
        }
    }

    /// Whether this failure means the backend itself is unhealthy, as opposed
    /// to a problem with one particular request.
    pub fn is_backend_outage(&self) -> bool {
        matches!(
            self,
            GenerateError::UpstreamUnavailable { .. } | GenerateError::RateLimited { .. }
        )
    }
}

impl From<HttpFailure> for GenerateError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::RateLimited { retry_after } => GenerateError::RateLimited { retry_after },
            HttpFailure::Unavailable { message } => GenerateError::UpstreamUnavailable { message },
            HttpFailure::Unauthorized { status } => GenerateError::UpstreamUnavailable {
                message: format!("credentials rejected (HTTP {status})"),
            },
            HttpFailure::Rejected { status, body } => GenerateError::UpstreamUnavailable {
                message: format!("request rejected with HTTP {status}: {body}"),
            },
        }
    }
}

/// Top-level error of [`RagService`](crate::service::RagService).
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Fatal at startup: the process cannot run with this configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The caller sent something unusable, e.g. a blank question
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embed(#[from] EmbedError),
}

impl RagError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Stable snake_case code, suitable for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Configuration { .. } => "configuration_error",
            RagError::InvalidRequest { .. } => "invalid_request",
            RagError::Ingest(e) => e.code(),
            RagError::Retrieve(e) => e.code(),
            RagError::Generate(e) => e.code(),
            RagError::Index(e) => e.code(),
            RagError::Embed(e) => e.code(),
        }
    }

    /// Only rate limiting is worth retrying as-is; everything else needs a
    /// change on the caller's or operator's side first.
    pub fn is_retryable(&self) -> bool {
        self.code() == "rate_limited"
    }
}

impl From<ChunkError> for RagError {
    fn from(e: ChunkError) -> Self {
        RagError::configuration(e.to_string())
    }
}
