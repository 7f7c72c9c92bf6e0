//! Document ingestion: reading files and splitting them into chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::RagError;
use crate::rag::chunk::{chunk_text, Chunk, ChunkingStrategy};

/// File extensions treated as ingestible text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "text"];

/// Record of one ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedDocument {
    pub id: String,
    pub path: Option<String>,
    pub title: String,
    pub chunk_count: usize,
    pub total_chars: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Splits documents into chunks according to a configured strategy.
pub struct DocumentIngestor {
    strategy: ChunkingStrategy,
}

impl DocumentIngestor {
    pub fn new(strategy: ChunkingStrategy) -> Self {
        Self { strategy }
    }

    /// Chunk a raw text with the given title.
    pub fn ingest_text(&self, title: &str, text: &str) -> (IngestedDocument, Vec<Chunk>) {
        let id = Uuid::new_v4().to_string();
        let chunks = chunk_text(&id, text, &self.strategy);
        let doc = IngestedDocument {
            id,
            path: None,
            title: title.to_string(),
            chunk_count: chunks.len(),
            total_chars: text.chars().count(),
            ingested_at: Utc::now(),
        };
        (doc, chunks)
    }

    /// Read and chunk a single file.
    pub async fn ingest_file(&self, path: &Path) -> Result<(IngestedDocument, Vec<Chunk>), RagError> {
        let text = tokio::fs::read_to_string(path).await?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let (mut doc, chunks) = self.ingest_text(&title, &text);
        doc.path = Some(path.display().to_string());
        debug!(
            path = %path.display(),
            chunks = chunks.len(),
            "Ingested file"
        );
        Ok((doc, chunks))
    }

    /// Recursively ingest all text files under a directory.
    ///
    /// Files that cannot be read (binary content, permission errors) are
    /// logged and skipped rather than failing the whole run.
    pub async fn ingest_directory(
        &self,
        dir: &Path,
    ) -> Result<Vec<(IngestedDocument, Vec<Chunk>)>, RagError> {
        let mut results = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_text_file(path) {
                continue;
            }
            match self.ingest_file(path).await {
                Ok(pair) => results.push(pair),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                }
            }
        }
        Ok(results)
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
