//! Generation with a model served by a local Ollama instance

use super::{Generation, GenerationBackend};
use crate::config::GenerationConfig;
use crate::error::GenerateError;
use async_trait::async_trait;
use docent_embed::http::{self, HttpFailure, RetryPolicy};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Deserialize)]
struct InstalledModel {
    name: String,
}

/// Generation backend backed by a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaGenerator {
    /// Connect to the configured server and check that the model is installed.
    ///
    /// # Errors
    /// [`GenerateError::ModelLoad`] when the server is unreachable or the model
    /// has not been pulled.
    pub async fn connect(config: &GenerationConfig) -> Result<Self, GenerateError> {
        let client =
            http::build_client(config.local_timeout()).map_err(|e| GenerateError::InvalidConfig {
                message: format!("cannot build HTTP client: {e}"),
            })?;
        let generator = Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.local_model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        generator.health_check().await?;
        tracing::info!(
            "Using local model {} served at {}",
            generator.model,
            generator.endpoint
        );
        Ok(generator)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<(), GenerateError> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = http::send_with_retry(single_attempt(), "Ollama", || self.client.get(&url))
            .await
            .map_err(|e| self.model_load(format!("cannot reach Ollama at {}: {e}", self.endpoint)))?;

        let tags: TagsResponse = http::decode_json(response)
            .await
            .map_err(GenerateError::invalid_response)?;
        if !tags.models.iter().any(|m| model_matches(&m.name, &self.model)) {
            return Err(self.model_load(format!(
                "model not installed, pull it with `ollama pull {}`",
                self.model
            )));
        }
        Ok(())
    }

    fn model_load(&self, message: String) -> GenerateError {
        GenerateError::ModelLoad {
            model: self.model.clone(),
            message,
        }
    }

    fn classify(&self, failure: HttpFailure) -> GenerateError {
        let specific = match &failure {
            HttpFailure::Unavailable { message } | HttpFailure::Rejected { body: message, .. }
                if mentions_memory(message) =>
            {
                Some(GenerateError::OutOfMemory {
                    message: message.clone(),
                })
            }
            HttpFailure::Rejected { status: 404, .. } => {
                Some(self.model_load("model not found on the server".to_string()))
            }
            HttpFailure::Rejected { body, .. } if body.contains("not found") => {
                Some(self.model_load(body.clone()))
            }
            _ => None,
        };
        specific.unwrap_or_else(|| failure.into())
    }
}

// Local calls are not retried.
fn single_attempt() -> RetryPolicy {
    RetryPolicy {
        retries: 0,
        backoff: Duration::ZERO,
    }
}

fn mentions_memory(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("out of memory") || message.contains("more system memory")
}

/// `llama3.2` matches an installed `llama3.2:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted || (!wanted.contains(':') && installed == format!("{wanted}:latest"))
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerateError> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: self.max_tokens,
                temperature: self.temperature,
            },
        };

        let response = http::send_with_retry(single_attempt(), "Ollama", || {
            self.client.post(&url).json(&request)
        })
        .await
        .map_err(|failure| self.classify(failure))?;

        let body: GenerateResponse = http::decode_json(response)
            .await
            .map_err(GenerateError::invalid_response)?;
        let text = body.response.trim();
        if text.is_empty() {
            return Err(GenerateError::invalid_response("model returned no text"));
        }
        tracing::debug!("{} returned {} characters", self.model, text.len());
        Ok(Generation::new(text, self.backend_name()))
    }

    fn backend_name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> OllamaGenerator {
        OllamaGenerator {
            client: Client::new(),
            endpoint: "http://127.0.0.1:11434".into(),
            model: "llama3.2:1b".into(),
            temperature: 0.2,
            max_tokens: 200,
        }
    }

    #[test]
    fn test_model_matching() {
        assert!(model_matches("llama3.2:1b", "llama3.2:1b"));
        assert!(model_matches("llama3.2:latest", "llama3.2"));
        assert!(!model_matches("llama3.2:3b", "llama3.2"));
        assert!(!model_matches("llama3.2:1b", "llama3.2:3b"));
    }

    #[test]
    fn test_failure_classification() {
        let g = generator();
        let oom = g.classify(HttpFailure::Unavailable {
            message: r#"HTTP 500: {"error":"model requires more system memory (5.5 GiB) than is available (2.1 GiB)"}"#.into(),
        });
        assert_eq!(oom.code(), "out_of_memory");

        let cuda = g.classify(HttpFailure::Unavailable {
            message: "HTTP 500: CUDA error: out of memory".into(),
        });
        assert_eq!(cuda.code(), "out_of_memory");

        let missing = g.classify(HttpFailure::Rejected {
            status: 404,
            body: r#"{"error":"model 'llama3.2:1b' not found"}"#.into(),
        });
        assert_eq!(missing.code(), "model_load_error");

        let down = g.classify(HttpFailure::Unavailable {
            message: "cannot connect to Ollama".into(),
        });
        assert_eq!(down.code(), "upstream_unavailable");
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerateRequest {
            model: "llama3.2:1b",
            prompt: "hi",
            stream: false,
            options: GenerateOptions {
                num_predict: 200,
                temperature: 0.5,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "model": "llama3.2:1b",
                "prompt": "hi",
                "stream": false,
                "options": {"num_predict": 200, "temperature": 0.5}
            })
        );
    }
}
