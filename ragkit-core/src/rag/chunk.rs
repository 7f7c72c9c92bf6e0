//! Document chunking strategies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous piece of a document, ready for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub chunk_index: usize,
}

impl Chunk {
    pub fn new(document_id: &str, text: String, chunk_index: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            text,
            chunk_index,
        }
    }
}

/// How a document is split into chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Split at fixed character offsets with overlap.
    FixedSize { chunk_size: usize, overlap: usize },
    /// Split on natural boundaries, falling back through a separator list
    /// until pieces fit within `chunk_size`.
    Recursive {
        separators: Vec<String>,
        chunk_size: usize,
        overlap: usize,
    },
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        Self::Recursive {
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
            chunk_size: 512,
            overlap: 64,
        }
    }
}

/// Split `text` into chunks according to `strategy`.
///
/// Empty or whitespace-only input yields no chunks. A document shorter than
/// the chunk size yields a single chunk.
pub fn chunk_text(document_id: &str, text: &str, strategy: &ChunkingStrategy) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let pieces = match strategy {
        ChunkingStrategy::FixedSize { chunk_size, overlap } => {
            split_fixed(text, (*chunk_size).max(1), *overlap)
        }
        ChunkingStrategy::Recursive {
            separators,
            chunk_size,
            overlap,
        } => split_recursive(text, separators, (*chunk_size).max(1), *overlap),
    };

    pieces
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .enumerate()
        .map(|(i, piece)| Chunk::new(document_id, piece.trim().to_string(), i))
        .collect()
}

/// Fixed-offset split on char boundaries. Overlap is clamped below the
/// chunk size so the window always advances.
fn split_fixed(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }
    let overlap = overlap.min(chunk_size - 1);
    let step = chunk_size - overlap;

    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    pieces
}

/// Split on the first separator that produces pieces, then greedily pack
/// pieces back together up to `chunk_size`. Oversized pieces recurse on the
/// remaining separators; when separators run out, fall back to fixed split.
fn split_recursive(
    text: &str,
    separators: &[String],
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }
    let Some((sep, rest)) = separators.split_first() else {
        return split_fixed(text, chunk_size, overlap);
    };

    let parts: Vec<&str> = text.split(sep.as_str()).collect();
    if parts.len() <= 1 {
        return split_recursive(text, rest, chunk_size, overlap);
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    for part in parts {
        let candidate_len = if current.is_empty() {
            part.chars().count()
        } else {
            current.chars().count() + sep.chars().count() + part.chars().count()
        };

        if candidate_len <= chunk_size {
            if !current.is_empty() {
                current.push_str(sep);
            }
            current.push_str(part);
            continue;
        }

        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if part.chars().count() > chunk_size {
            pieces.extend(split_recursive(part, rest, chunk_size, overlap));
        } else {
            current = part.to_string();
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
