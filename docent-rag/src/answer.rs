//! Grounded answers: retrieved passages in, cited text out.

use crate::error::GenerateError;
use crate::generate::GenerationBackend;
use docent_retriever::{RetrievalResult, ScoredChunk};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// What the assistant says when the corpus has nothing relevant.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "I don't have enough information in the provided documents to answer that.";

const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// A generated answer and the passages it rests on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// Chunk identifiers of the supporting passages, in prompt order
    pub citations: Vec<String>,
    /// Backend that wrote the answer; `None` when no backend was called
    pub backend: Option<String>,
}

impl Answer {
    pub fn insufficient_context() -> Self {
        Self {
            text: INSUFFICIENT_CONTEXT_ANSWER.to_string(),
            citations: Vec::new(),
            backend: None,
        }
    }

    pub fn is_grounded(&self) -> bool {
        !self.citations.is_empty()
    }
}

/// A rendered prompt and the chunks it contains, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub passages: Vec<String>,
}

/// Render the prompt for `question` over `hits`, best first.
///
/// Passages are added whole until `max_context_chars` would be exceeded. The
/// first passage is always included, cut to the budget if it must be.
pub fn build_prompt(question: &str, hits: &[ScoredChunk], max_context_chars: usize) -> Prompt {
    let mut blocks = Vec::new();
    let mut passages = Vec::new();
    let mut used = 0;

    for (i, hit) in hits.iter().enumerate() {
        let header = format!("[{}] (source: {})\n", i + 1, hit.source());
        let text = hit.text().trim();
        let cost = header.chars().count() + text.chars().count();

        if used + cost > max_context_chars {
            if blocks.is_empty() {
                let room = max_context_chars.saturating_sub(header.chars().count());
                let cut: String = text.chars().take(room).collect();
                blocks.push(format!("{header}{cut}"));
                passages.push(hit.chunk_id().to_string());
            }
            break;
        }
        used += cost + PASSAGE_SEPARATOR.len();
        blocks.push(format!("{header}{text}"));
        passages.push(hit.chunk_id().to_string());
    }

    let text = format!(
        "You answer questions using only the numbered context passages below. \
         Cite the passages you rely on by number, like [1]. \
         If the passages do not contain the answer, reply exactly: \
         \"{INSUFFICIENT_CONTEXT_ANSWER}\"\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer in a clear and concise way.",
        blocks.join(PASSAGE_SEPARATOR),
        question.trim()
    );
    Prompt { text, passages }
}

/// Passage numbers referenced as `[n]`, `[n, m]` or `[n][m]` in `text`.
fn cited_numbers(text: &str) -> BTreeSet<usize> {
    let mut numbers = BTreeSet::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find(']') else {
            break;
        };
        let inside = &rest[..close];
        let parsed: Option<Vec<usize>> = inside
            .split(',')
            .map(|part| part.trim().parse().ok())
            .collect();
        if let Some(parsed) = parsed {
            numbers.extend(parsed);
        }
        rest = &rest[close + 1..];
    }
    numbers
}

/// Which of `passages` an answer relies on. Explicit `[n]` markers win; an
/// answer without markers is attributed to every passage it was given, and a
/// refusal to none.
fn resolve_citations(answer: &str, passages: &[String]) -> Vec<String> {
    if answer.trim_start().starts_with(INSUFFICIENT_CONTEXT_ANSWER) {
        return Vec::new();
    }
    let cited: Vec<String> = cited_numbers(answer)
        .into_iter()
        .filter_map(|n| n.checked_sub(1).and_then(|i| passages.get(i)).cloned())
        .collect();
    if cited.is_empty() {
        passages.to_vec()
    } else {
        cited
    }
}

/// Turns a question and its retrieved passages into an [`Answer`].
pub struct AnswerGenerator<G> {
    backend: Arc<G>,
    max_context_chars: usize,
}

impl<G> Clone for AnswerGenerator<G> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            max_context_chars: self.max_context_chars,
        }
    }
}

impl<G: GenerationBackend> AnswerGenerator<G> {
    pub fn new(backend: Arc<G>, max_context_chars: usize) -> Self {
        Self {
            backend,
            max_context_chars: max_context_chars.max(1),
        }
    }

    pub fn backend(&self) -> &Arc<G> {
        &self.backend
    }

    /// Answer `question` from `result` alone.
    ///
    /// An empty result gives [`Answer::insufficient_context`] without calling
    /// the backend.
    pub async fn generate(
        &self,
        question: &str,
        result: &RetrievalResult,
    ) -> Result<Answer, GenerateError> {
        if result.is_empty() {
            tracing::debug!("No supporting passages, declining to answer");
            return Ok(Answer::insufficient_context());
        }

        let prompt = build_prompt(question, &result.hits, self.max_context_chars);
        tracing::debug!(
            "Prompting {} with {} passages ({} chars)",
            self.backend.active_backend(),
            prompt.passages.len(),
            prompt.text.len()
        );
        let generation = self.backend.generate(&prompt.text).await?;
        let citations = resolve_citations(&generation.text, &prompt.passages);

        Ok(Answer {
            text: generation.text,
            citations,
            backend: Some(generation.backend),
        })
    }
}
