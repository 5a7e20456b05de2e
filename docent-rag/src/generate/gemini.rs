//! Hosted generation through the Gemini `generateContent` REST endpoint

use super::{Generation, GenerationBackend};
use crate::config::GenerationConfig;
use crate::error::GenerateError;
use async_trait::async_trait;
use docent_embed::RemoteConfig;
use docent_embed::http::{self, RetryPolicy};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Generation backend backed by the Gemini API.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    policy: RetryPolicy,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiGenerator {
    /// Build the client. No request is made until the first question.
    ///
    /// # Errors
    /// [`GenerateError::InvalidConfig`] when no API key is configured.
    pub fn new(config: &GenerationConfig, remote: &RemoteConfig) -> Result<Self, GenerateError> {
        let invalid = |e: &dyn std::fmt::Display| GenerateError::InvalidConfig {
            message: e.to_string(),
        };
        remote.validate().map_err(|e| invalid(&e))?;
        let api_key = remote.require_api_key().map_err(|e| invalid(&e))?.to_string();
        let client = http::build_client(remote.timeout()).map_err(|e| invalid(&e))?;

        let model = config
            .remote_model()
            .trim_start_matches("models/")
            .to_string();
        Ok(Self {
            client,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                remote.base_url(),
                model
            ),
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            policy: remote.retry_policy(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn extract_text(body: GenerateContentResponse) -> Result<String, GenerateError> {
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerateError::invalid_response(format!(
            "prompt blocked: {reason}"
        )));
    }
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenerateError::invalid_response("response contains no candidates"))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(GenerateError::invalid_response(format!(
            "candidate has no text (finish reason: {reason})"
        )));
    }
    Ok(text.trim().to_string())
}

#[async_trait]
impl GenerationBackend for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerateError> {
        let request = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationSettings {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let response = http::send_with_retry(self.policy, "Gemini generation", || {
            self.client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
        })
        .await?;

        let body: GenerateContentResponse = http::decode_json(response)
            .await
            .map_err(GenerateError::invalid_response)?;
        let text = extract_text(body)?;
        tracing::debug!("Gemini returned {} characters", text.len());
        Ok(Generation::new(text, self.backend_name()))
    }

    fn backend_name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: "hi" }],
            }],
            generation_config: GenerationSettings {
                temperature: 0.5,
                max_output_tokens: 64,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "generationConfig": {"temperature": 0.5, "maxOutputTokens": 64}
            })
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = parse(serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "The sky "}, {"text": "is blue. [1]"}]},
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(extract_text(body).unwrap(), "The sky is blue. [1]");
    }

    #[test]
    fn test_extract_text_rejects_empty_and_blocked() {
        let blocked = parse(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }));
        let err = extract_text(blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let none = parse(serde_json::json!({"candidates": []}));
        assert_eq!(extract_text(none).unwrap_err().code(), "invalid_response");

        let empty = parse(serde_json::json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }));
        assert!(extract_text(empty).unwrap_err().to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn test_missing_api_key_is_a_config_error() {
        let result = GeminiGenerator::new(&GenerationConfig::default(), &RemoteConfig::default());
        assert!(matches!(result, Err(GenerateError::InvalidConfig { .. })));
    }

    #[test]
    fn test_endpoint() {
        let remote = RemoteConfig::default()
            .with_api_key("k")
            .with_base_url("http://127.0.0.1:1/");
        let config = GenerationConfig {
            model: Some("models/gemini-pro".into()),
            ..GenerationConfig::default()
        };
        let generator = GeminiGenerator::new(&config, &remote).unwrap();
        assert_eq!(
            generator.endpoint,
            "http://127.0.0.1:1/v1beta/models/gemini-pro:generateContent"
        );
        assert_eq!(generator.model(), "gemini-pro");
    }
}
