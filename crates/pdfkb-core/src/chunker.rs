//! Sliding-window character chunker with boundary adjustment.
//!
//! Windows are measured in characters, not bytes, so multi-byte text never
//! splits inside a code point.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Chunk;

/// How far past the naive edge the whitespace rule may look.
const WHITESPACE_LOOKAHEAD: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Extend the edge to the next whitespace if it is fewer than 50 chars away.
    #[default]
    Whitespace,
    /// Retract the edge to just after the last sentence terminator or line
    /// break if that is within half a window; otherwise use the whitespace rule.
    Sentence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub boundary: Boundary,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, overlap: 100, boundary: Boundary::Whitespace }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunking.chunk_size must be > 0"));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::invalid_config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Split `text` into overlapping, trimmed, non-empty windows.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        let size = self.config.chunk_size;
        let mut out = Vec::new();
        let mut start = 0usize;
        while start < n {
            let naive_end = (start + size).min(n);
            let end = if naive_end < n { self.adjust_edge(&chars, start, naive_end) } else { naive_end };
            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() { out.push(piece.to_string()); }
            if end >= n { break; }
            // start must strictly increase or the loop would never terminate
            start = end.saturating_sub(self.config.overlap).max(start + 1);
        }
        debug!(chars = n, chunks = out.len(), "chunked document");
        out
    }

    /// Chunk and assign positional ids.
    pub fn chunk_document(&self, text: &str) -> Vec<Chunk> { Chunk::from_texts(&self.chunk(text)) }

    fn adjust_edge(&self, chars: &[char], start: usize, end: usize) -> usize {
        match self.config.boundary {
            Boundary::Whitespace => next_whitespace(chars, end).unwrap_or(end),
            Boundary::Sentence => {
                let half = self.config.chunk_size / 2;
                match last_sentence_break(chars, start, end) {
                    Some(cut) if end - cut <= half => cut,
                    _ => next_whitespace(chars, end).unwrap_or(end),
                }
            }
        }
    }
}

fn next_whitespace(chars: &[char], from: usize) -> Option<usize> {
    chars[from..]
        .iter()
        .take(WHITESPACE_LOOKAHEAD)
        .position(|c| c.is_whitespace())
        .map(|offset| from + offset)
}

/// Position just after the last `.`, `!`, `?` or newline in `chars[start..end]`.
fn last_sentence_break(chars: &[char], start: usize, end: usize) -> Option<usize> {
    chars[start..end]
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|offset| start + offset + 1)
        .filter(|&cut| cut > start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize, boundary: Boundary) -> Chunker {
        Chunker::new(ChunkingConfig { chunk_size: size, overlap, boundary }).expect("valid config")
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        assert!(Chunker::new(ChunkingConfig { chunk_size: 10, overlap: 10, boundary: Boundary::Whitespace }).is_err());
        assert!(Chunker::new(ChunkingConfig { chunk_size: 0, overlap: 0, boundary: Boundary::Whitespace }).is_err());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let c = Chunker::default();
        assert_eq!(c.chunk("  hello world  "), vec!["hello world".to_string()]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(Chunker::default().chunk("   \n\t ").is_empty());
        assert!(Chunker::default().chunk("").is_empty());
    }

    #[test]
    fn whitespace_rule_does_not_split_words() {
        let c = chunker(8, 2, Boundary::Whitespace);
        let chunks = c.chunk("alpha bravo charlie delta");
        // edge at 8 lands inside "bravo" and is pushed to the space after it
        assert_eq!(chunks[0], "alpha bravo");
        for ch in &chunks {
            for word in ch.split_whitespace() {
                assert!(["alpha", "bravo", "charlie", "delta"].iter().any(|w| w.ends_with(word)), "{word}");
            }
        }
    }

    #[test]
    fn whitespace_rule_gives_up_beyond_lookahead() {
        let long_word = "x".repeat(120);
        let c = chunker(10, 0, Boundary::Whitespace);
        let chunks = c.chunk(&long_word);
        assert_eq!(chunks[0].chars().count(), 10);
        assert_eq!(chunks.concat(), long_word);
    }

    #[test]
    fn sentence_rule_retracts_to_terminator() {
        let c = chunker(30, 0, Boundary::Sentence);
        let text = "First sentence here. Second sentence is longer than the window.";
        let chunks = c.chunk(text);
        assert_eq!(chunks[0], "First sentence here.");
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text: String = (0..200).map(|i| format!("w{i} ")).collect();
        let c = chunker(100, 20, Boundary::Whitespace);
        let chunks = c.chunk(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
            assert!(pair[1].contains(tail.trim()), "next chunk should repeat the previous tail");
        }
    }

    #[test]
    fn multibyte_text_is_safe() {
        let text = "héllo wörld ünïcödé ".repeat(30);
        let c = chunker(25, 5, Boundary::Sentence);
        let chunks = c.chunk(&text);
        assert!(!chunks.is_empty());
        for ch in chunks { assert!(ch.chars().count() <= 25 + WHITESPACE_LOOKAHEAD); }
    }

    #[test]
    fn chunk_document_assigns_positional_ids() {
        let c = chunker(10, 2, Boundary::Whitespace);
        let chunks = c.chunk_document("one two three four five six seven");
        assert_eq!(chunks[0].id, "chunk_0");
        assert_eq!(chunks.last().map(|c| c.id.clone()), Some(format!("chunk_{}", chunks.len() - 1)));
    }
}
