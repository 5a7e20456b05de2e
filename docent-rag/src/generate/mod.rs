//! Generation backends: prompt in, text out.
//!
//! - [`gemini`]: hosted model through the `generateContent` REST API
//! - [`ollama`]: locally served model
//! - [`failover`]: remote first, local while the remote is failing
//! - [`backend`]: the closed [`Generator`] enum selected from configuration

pub mod backend;
pub mod failover;
pub mod gemini;
pub mod ollama;

pub use backend::Generator;
pub use failover::FailoverGenerator;
pub use gemini::GeminiGenerator;
pub use ollama::OllamaGenerator;

use crate::error::GenerateError;
use async_trait::async_trait;

/// Text produced by a backend, tagged with the backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub backend: String,
}

impl Generation {
    pub fn new(text: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            backend: backend.into(),
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Complete `prompt`.
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerateError>;

    /// Short name of this backend, e.g. `gemini`.
    fn backend_name(&self) -> &str;

    /// The backend that would serve a request right now. Differs from
    /// [`backend_name`](Self::backend_name) only for composite backends.
    fn active_backend(&self) -> String {
        self.backend_name().to_string()
    }
}
