//! Ingestion of uploaded text documents into the knowledge base.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;
use serde::Serialize;

use super::chunker::TextChunker;
use super::store::{KnowledgeBase, Metadata};
use crate::core::errors::ApiError;
use crate::llm::EmbeddingProvider;

const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub chunks: usize,
}

pub struct Ingestor {
    knowledge: Arc<KnowledgeBase>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: TextChunker,
    upload_dir: Option<PathBuf>,
}

impl Ingestor {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunker: TextChunker,
    ) -> Self {
        Self {
            knowledge,
            embedder,
            chunker,
            upload_dir: None,
        }
    }

    /// Keep a copy of every accepted upload in `dir`.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    /// Validates an uploaded file, stores a copy and ingests its text under
    /// the sanitised file name.
    pub async fn ingest_upload(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport, ApiError> {
        let source = sanitize_filename(filename);
        if source.is_empty() {
            return Err(ApiError::BadRequest("No selected file".to_string()));
        }

        let extension = Path::new(&source)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            let shown = if extension.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", extension)
            };
            return Err(ApiError::BadRequest(format!(
                "Unsupported file type: {}",
                shown
            )));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest("File is empty".to_string()));
        }

        if let Some(dir) = &self.upload_dir {
            let path = dir.join(&source);
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(ApiError::internal)?;
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| ApiError::Internal(format!("Failed to save upload: {}", e)))?;
        }

        self.ingest_text(text, &source).await
    }

    /// Chunks, embeds and appends `text` with every chunk attributed to `source`.
    pub async fn ingest_text(&self, text: &str, source: &str) -> Result<IngestReport, ApiError> {
        let pieces = self.chunker.split(text);
        if pieces.is_empty() {
            return Err(ApiError::BadRequest("File is empty".to_string()));
        }

        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;

        let ingested_at = Utc::now().to_rfc3339();
        let metadatas: Vec<Metadata> = pieces
            .iter()
            .map(|p| {
                Metadata::with_source(source)
                    .with_field("chunk_index", p.chunk_index)
                    .with_field("ingested_at", ingested_at.clone())
            })
            .collect();

        let count = texts.len();
        let total = self.knowledge.append(vectors, texts, metadatas).await?;
        tracing::info!(
            "Ingested {} chunks from {} (knowledge base now holds {})",
            count,
            source,
            total
        );

        Ok(IngestReport {
            source: source.to_string(),
            chunks: count,
        })
    }
}

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static pattern is valid"))
}

/// Strips directories, replaces anything outside `[A-Za-z0-9._-]` with `_`
/// and trims leading dots and underscores.
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let replaced = unsafe_chars().replace_all(base, "_");
    replaced.trim_start_matches(['.', '_']).to_string()
}
