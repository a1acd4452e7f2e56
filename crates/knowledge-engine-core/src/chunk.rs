//! Fixed-window text chunker with overlap.
//!
//! Splits document content into bounded-size windows measured in
//! characters (not bytes), with each window starting `overlap_chars`
//! characters before the end of the previous one so that context spanning
//! a boundary appears in both neighbours.
//!
//! The same strategy is used for every ingestion and re-ingestion; chunk
//! boundaries must be stable for retrieval quality to be stable.
//!
//! # Algorithm
//!
//! 1. Normalize line endings (`\r\n` → `\n`) and trim the whole input.
//! 2. Take the window `[start, start + max_chars)`, clamped to the text end.
//! 3. Trim the window; emit it unless it is blank.
//! 4. Stop if the window reached the end of the text.
//! 5. Otherwise the next window starts at `end - overlap_chars`, but always
//!    at least one character after the current start.
//!
//! # Example
//!
//! ```rust
//! use knowledge_engine_core::chunk::chunk_text;
//!
//! let text = "a".repeat(1850);
//! let chunks = chunk_text(&text, 900, 120);
//! assert_eq!(chunks.len(), 3);
//! assert!(chunk_text("   ", 900, 120).is_empty());
//! ```

use crate::error::EngineError;
use crate::models::TextChunk;

/// Default window size in characters.
pub const DEFAULT_MAX_CHARS: usize = 900;

/// Default overlap between adjacent windows in characters.
pub const DEFAULT_OVERLAP_CHARS: usize = 120;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

impl ChunkerConfig {
    /// Build a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if `max_chars` is zero or
    /// `overlap_chars >= max_chars`.
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, EngineError> {
        let config = Self {
            max_chars,
            overlap_chars,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_chars == 0 {
            return Err(EngineError::Validation(
                "chunking max_chars must be > 0".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(EngineError::Validation(format!(
                "chunking overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    /// Chunk `text` with this configuration.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        chunk_spans(text, self.max_chars, self.overlap_chars)
    }
}

/// Normalize line endings and trim surrounding whitespace.
pub fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim().to_string()
}

/// Split text into ordered chunk strings.
///
/// Returns an empty vector for empty or whitespace-only input; callers
/// must treat that as a validation failure.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    chunk_spans(text, max_chars, overlap_chars)
        .into_iter()
        .map(|c| c.text)
        .collect()
}

/// Split text into ordered [`TextChunk`]s, keeping each window's character
/// range in the normalized text.
///
/// # Guarantees
///
/// - Deterministic for identical input and parameters.
/// - Never emits blank chunks.
/// - Indices are contiguous: `0, 1, …, N-1`.
/// - Always terminates: every iteration advances the window start by at
///   least one character, even for `overlap_chars >= max_chars`.
pub fn chunk_spans(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<TextChunk> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let max_chars = max_chars.max(1);

    // Byte offset of every char boundary, plus the end of the string.
    let offsets: Vec<usize> = normalized
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(normalized.len()))
        .collect();
    let char_count = offsets.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < char_count {
        let end = (start + max_chars).min(char_count);
        let window = &normalized[offsets[start]..offsets[end]];
        let trimmed = window.trim();

        if !trimmed.is_empty() {
            chunks.push(TextChunk {
                index: chunks.len(),
                start,
                end,
                text: trimmed.to_string(),
            });
        }

        if end >= char_count {
            break;
        }

        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    chunks
}
