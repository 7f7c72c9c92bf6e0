//! Assembly of retrieved chunks into a prompt context block.

use crate::rag::retriever::RetrievedChunk;

/// Rough conversion factor from characters to tokens.
const CHARS_PER_TOKEN: f32 = 4.0;

/// Separator inserted between chunks in the assembled context.
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// The context block built from retrieved chunks, plus what went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    pub chunks_used: usize,
    /// True if the token budget cut off one or more chunks.
    pub truncated: bool,
}

/// Joins chunks into a single context block under a token budget.
pub struct ContextAssembler {
    max_tokens: usize,
}

impl ContextAssembler {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    fn estimate_tokens(text: &str) -> usize {
        (text.chars().count() as f32 / CHARS_PER_TOKEN).ceil() as usize
    }

    /// Assemble chunks in order until the budget is exhausted.
    ///
    /// Chunks are taken whole; a chunk that would overflow the budget is
    /// dropped along with everything after it.
    pub fn assemble(&self, chunks: &[RetrievedChunk]) -> AssembledContext {
        let mut text = String::new();
        let mut used = 0;
        let mut truncated = false;

        for chunk in chunks {
            let addition = if text.is_empty() {
                chunk.text.clone()
            } else {
                format!("{}{}", CHUNK_SEPARATOR, chunk.text)
            };
            if Self::estimate_tokens(&text) + Self::estimate_tokens(&addition) > self.max_tokens {
                truncated = true;
                break;
            }
            text.push_str(&addition);
            used += 1;
        }

        AssembledContext {
            text,
            chunks_used: used,
            truncated,
        }
    }
}
