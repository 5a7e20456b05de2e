//! Fixed-size, overlapping passage splitting for retrieval.
//!
//! Documents are cut into passages of at most `max_size` characters. Each passage
//! after the first starts `overlap` characters before the end of its predecessor,
//! so a sentence that straddles a boundary still appears whole in at least one
//! passage. Sizes and offsets are counted in `char`s, never bytes, so multi-byte
//! text is never cut inside a code point.
//!
//! ```
//! use docent_context::text::{split, reconstruct};
//!
//! let text = "The sky is blue. Water is wet.";
//! let chunks = split(text, 20, 5).unwrap();
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "The sky is blue. Wat");
//! assert_eq!(chunks[1].text, ". Water is wet.");
//! assert_eq!(chunks[1].overlap, 5);
//! assert_eq!(reconstruct(&chunks), text);
//! ```

use crate::error::{ChunkError, Result};
use serde::{Deserialize, Serialize};

/// Default passage length in characters.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default number of characters shared by consecutive passages.
pub const DEFAULT_OVERLAP: usize = 200;

/// Chunk size settings, validated once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum passage length in characters
    pub max_size: usize,
    /// Characters shared between consecutive passages
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        let config = Self { max_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Check the `0 <= overlap < max_size` constraint.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(ChunkError::InvalidParameters {
                max_size: self.max_size,
                overlap: self.overlap,
                reason: "max_size must be greater than zero",
            });
        }
        if self.overlap >= self.max_size {
            return Err(ChunkError::InvalidParameters {
                max_size: self.max_size,
                overlap: self.overlap,
                reason: "overlap must be smaller than max_size",
            });
        }
        Ok(())
    }

    /// Split `text` with these settings.
    pub fn split(&self, text: &str) -> Result<Vec<TextChunk>> {
        split(text, self.max_size, self.overlap)
    }
}

/// One passage cut from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this passage within its document (0-indexed)
    pub sequence: usize,
    /// Character offset of the first character
    pub start: usize,
    /// Character offset one past the last character
    pub end: usize,
    /// Characters shared with the previous passage (0 for the first one)
    pub overlap: usize,
    /// The passage text
    pub text: String,
}

impl TextChunk {
    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }

    /// The part of this passage not already covered by its predecessor.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

/// Splits `text` into passages of at most `max_size` characters where consecutive
/// passages share exactly `overlap` characters.
///
/// The passages cover the whole input with no gaps; only the final passage may be
/// shorter than `max_size`. Empty input produces no passages.
///
/// # Errors
/// [`ChunkError::InvalidParameters`] unless `0 <= overlap < max_size`.
pub fn split(text: &str, max_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    ChunkingConfig { max_size, overlap }.validate()?;

    // Byte offset of every char boundary, including the end of the string.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let step = max_size - overlap;
    let mut start = 0;

    while start < char_count {
        let end = (start + max_size).min(char_count);
        chunks.push(TextChunk {
            sequence: chunks.len(),
            start,
            end,
            overlap: if start == 0 { 0 } else { overlap },
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });
        if end == char_count {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Rebuilds the original text from passages produced by [`split`] by dropping the
/// overlapping prefix of every passage after the first.
pub fn reconstruct(chunks: &[TextChunk]) -> String {
    chunks.iter().map(TextChunk::fresh_text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sky_scenario() {
        let text = "The sky is blue. Water is wet.";
        let chunks = split(text, 20, 5).unwrap();

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 20);
            assert_eq!(chunk.text.chars().count(), chunk.char_len());
        }
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 5);
            let tail: String = pair[0].text.chars().skip(pair[0].char_len() - 5).collect();
            let head: String = pair[1].text.chars().take(5).collect();
            assert_eq!(tail, head);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_split_reconstructs_long_text() {
        let text = (0..100)
            .map(|i| format!("Sentence number {i} talks about something. "))
            .collect::<String>();

        for (max_size, overlap) in [(50, 0), (50, 10), (128, 127), (1, 0), (1000, 200)] {
            let chunks = split(&text, max_size, overlap).unwrap();
            assert_eq!(reconstruct(&chunks), text, "max={max_size} overlap={overlap}");
            assert!(chunks.iter().all(|c| c.char_len() <= max_size));
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.sequence, i);
                if i + 1 < chunks.len() {
                    assert_eq!(chunk.char_len(), max_size, "only the last chunk may be short");
                    assert_eq!(chunks[i + 1].overlap, overlap);
                }
            }
        }
    }

    #[test]
    fn test_split_multibyte_text() {
        let text = "日本語のテキストと emoji 🎉🎉 が混ざった文章です。";
        let chunks = split(text, 7, 3).unwrap();

        assert_eq!(reconstruct(&chunks), text);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 7));
        assert_eq!(chunks.last().unwrap().end, text.chars().count());
    }

    #[test]
    fn test_split_short_and_empty_input() {
        let chunks = split("short", 20, 5).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short");
        assert_eq!(chunks[0].overlap, 0);

        assert!(split("", 20, 5).unwrap().is_empty());
        assert_eq!(reconstruct(&[]), "");
    }

    #[test]
    fn test_split_exact_multiple_has_no_trailing_sliver() {
        // 20 chars, max 20: one chunk, not a second chunk made only of overlap.
        let text = "abcdefghijklmnopqrst";
        let chunks = split(text, 20, 5).unwrap();
        assert_eq!(chunks.len(), 1);

        let chunks = split("abcdefghijklmnopqrstuvwxy", 20, 5).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "pqrstuvwxy");
    }

    #[test]
    fn test_split_rejects_invalid_parameters() {
        assert!(matches!(
            split("text", 0, 0),
            Err(ChunkError::InvalidParameters { .. })
        ));
        assert!(matches!(
            split("text", 10, 10),
            Err(ChunkError::InvalidParameters { .. })
        ));
        assert!(ChunkingConfig::new(10, 11).is_err());
        assert!(ChunkingConfig::new(10, 9).is_ok());
    }

    #[test]
    fn test_split_is_deterministic() {
        let text = "Deterministic output for identical input. ".repeat(20);
        assert_eq!(split(&text, 64, 16).unwrap(), split(&text, 64, 16).unwrap());
    }

    #[test]
    fn test_config_builder_methods() {
        let config = ChunkingConfig::default().with_max_size(300).with_overlap(30);
        assert_eq!(config.max_size, 300);
        assert_eq!(config.overlap, 30);
        assert!(config.validate().is_ok());
        assert_eq!(config.split("abc").unwrap().len(), 1);
    }
}
