//! # docent-rag
//!
//! Grounded question answering over a local document corpus. Documents are
//! chunked, embedded and indexed by `docent-retriever`; questions retrieve the
//! closest passages and a generation backend answers from those passages alone.
//!
//! ```no_run
//! use docent_rag::{RagConfig, RagService};
//! use docent_context::Document;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = RagService::start(RagConfig::load(None)?).await?;
//! service
//!     .upload(Document::new("sky.txt", "The sky is blue. Water is wet."))
//!     .await?;
//!
//! let answer = service.query("What color is the sky?").await?;
//! println!("{} (sources: {:?})", answer.text, answer.citations);
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: [`RagConfig`], TOML plus `DOCENT_*` environment overrides
//! - [`generate`]: Gemini, Ollama and failover generation backends
//! - [`answer`]: prompt construction and the [`AnswerGenerator`]
//! - [`service`]: [`RagService`], the transport-facing entry point
//! - [`error`]: [`RagError`] and its stable error codes

pub mod answer;
pub mod config;
pub mod error;
pub mod generate;
pub mod service;

pub use answer::{Answer, AnswerGenerator, INSUFFICIENT_CONTEXT_ANSWER};
pub use config::{GenerationBackendKind, GenerationConfig, RagConfig};
pub use error::{GenerateError, RagError};
pub use generate::{
    FailoverGenerator, GeminiGenerator, Generation, GenerationBackend, Generator, OllamaGenerator,
};
pub use service::{IngestSummary, RagService, StatusReport};
