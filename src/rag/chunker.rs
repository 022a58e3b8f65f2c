//! Splits ingested text into overlapping chunks.

use serde::{Deserialize, Serialize};

use crate::core::config::IngestionSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

impl From<&IngestionSettings> for ChunkerConfig {
    fn from(settings: &IngestionSettings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
        }
    }
}

/// A piece of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    /// Character offset in the original document
    pub start_offset: usize,
    /// Position of the chunk within its document
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Windows of up to `chunk_size` characters, each cut back to a sentence
    /// end when one sits near the window's end. The next window starts
    /// `chunk_overlap` characters before the cut, so every character lands in
    /// at least one window. Whitespace-only windows are dropped.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let chunk_size = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap;

        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total_chars {
            let end = (start + chunk_size).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let cut = if end < total_chars {
                find_sentence_boundary(&window)
            } else {
                window.as_str()
            };

            let trimmed = cut.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    text: trimmed.to_string(),
                    start_offset: start,
                    chunk_index: chunks.len(),
                });
            }

            if end == total_chars {
                break;
            }
            let cut_chars = cut.chars().count();
            start += cut_chars.saturating_sub(overlap).max(1);
        }

        chunks
    }
}

/// Longest prefix of `text` ending at a sentence break inside its last 20%,
/// or the whole text when there is none.
fn find_sentence_boundary(text: &str) -> &str {
    let sentence_endings = [". ", "! ", "? ", ".\n", "!\n", "?\n", "\n\n"];

    let mut search_start = (text.len() * 80) / 100;
    while !text.is_char_boundary(search_start) {
        search_start += 1;
    }
    let search_text = &text[search_start..];

    sentence_endings
        .iter()
        .filter_map(|ending| search_text.rfind(ending).map(|pos| pos + ending.len()))
        .max()
        .map(|cut| &text[..search_start + cut])
        .unwrap_or(text)
}
