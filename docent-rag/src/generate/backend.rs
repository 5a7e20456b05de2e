//! The generation backend chosen once from configuration

use super::{FailoverGenerator, GeminiGenerator, Generation, GenerationBackend, OllamaGenerator};
use crate::config::{GenerationBackendKind, GenerationConfig};
use crate::error::GenerateError;
use async_trait::async_trait;
use docent_embed::RemoteConfig;

pub enum Generator {
    Remote(GeminiGenerator),
    Local(OllamaGenerator),
    Failover(FailoverGenerator<GeminiGenerator, OllamaGenerator>),
}

impl Generator {
    /// Build the configured backend. A local model is checked for presence
    /// here, so a missing model stops startup rather than the first question.
    pub async fn from_config(
        config: &GenerationConfig,
        remote: &RemoteConfig,
    ) -> Result<Self, GenerateError> {
        match (config.backend, config.failover) {
            (GenerationBackendKind::Local, _) => {
                Ok(Generator::Local(OllamaGenerator::connect(config).await?))
            }
            (GenerationBackendKind::Remote, false) => {
                Ok(Generator::Remote(GeminiGenerator::new(config, remote)?))
            }
            (GenerationBackendKind::Remote, true) => {
                let primary = GeminiGenerator::new(config, remote)?;
                let fallback = OllamaGenerator::connect(config).await?;
                Ok(Generator::Failover(FailoverGenerator::new(
                    primary,
                    fallback,
                    config.failover_cooldown(),
                )))
            }
        }
    }

    pub fn kind(&self) -> GenerationBackendKind {
        match self {
            Generator::Local(_) => GenerationBackendKind::Local,
            Generator::Remote(_) | Generator::Failover(_) => GenerationBackendKind::Remote,
        }
    }
}

#[async_trait]
impl GenerationBackend for Generator {
    async fn generate(&self, prompt: &str) -> Result<Generation, GenerateError> {
        match self {
            Generator::Remote(g) => g.generate(prompt).await,
            Generator::Local(g) => g.generate(prompt).await,
            Generator::Failover(g) => g.generate(prompt).await,
        }
    }

    fn backend_name(&self) -> &str {
        match self {
            Generator::Remote(g) => g.backend_name(),
            Generator::Local(g) => g.backend_name(),
            Generator::Failover(g) => g.backend_name(),
        }
    }

    fn active_backend(&self) -> String {
        match self {
            Generator::Remote(g) => g.active_backend(),
            Generator::Local(g) => g.active_backend(),
            Generator::Failover(g) => g.active_backend(),
        }
    }
}
