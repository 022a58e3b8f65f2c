//! Knowledge base: the vector index plus its index-aligned chunk and
//! metadata sequences.
//!
//! Row `i` of the index, `chunks[i]` and `metadatas[i]` always describe the
//! same piece of text. The only mutation is an append of all three under
//! one write lock.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::index::{FlatL2Index, VectorIndex};
use crate::core::errors::ApiError;

const INDEX_FILE: &str = "index.json";
const META_FILE: &str = "meta.json";

/// Source label used when a chunk's metadata carries none.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Per-chunk metadata. `source` identifies where the text came from; any
/// other fields are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn source_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.source.as_deref().unwrap_or(fallback)
    }
}

/// A chunk returned by a search, with its 0-based rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub rank: usize,
    pub chunk: String,
    pub metadata: Metadata,
}

impl Candidate {
    pub fn new(rank: usize, chunk: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            rank,
            chunk: chunk.into(),
            metadata,
        }
    }

    /// Same chunk text and same metadata, regardless of rank.
    pub fn same_pair(&self, other: &Candidate) -> bool {
        self.chunk == other.chunk && self.metadata == other.metadata
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataBlob {
    chunks: Vec<String>,
    metadatas: Vec<Metadata>,
}

struct Corpus {
    index: Box<dyn VectorIndex>,
    chunks: Vec<String>,
    metadatas: Vec<Metadata>,
}

pub struct KnowledgeBase {
    corpus: RwLock<Corpus>,
    storage_dir: Option<PathBuf>,
}

impl KnowledgeBase {
    /// In-memory knowledge base over an empty flat index.
    pub fn in_memory() -> Self {
        Self::with_index(Box::new(FlatL2Index::new()))
    }

    /// In-memory knowledge base over a caller-supplied empty index.
    pub fn with_index(index: Box<dyn VectorIndex>) -> Self {
        Self {
            corpus: RwLock::new(Corpus {
                index,
                chunks: Vec::new(),
                metadatas: Vec::new(),
            }),
            storage_dir: None,
        }
    }

    /// Loads the index and metadata blobs from `dir`. Missing or unreadable
    /// blobs leave an empty knowledge base; appends are persisted to `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mut index = load_index(&dir.join(INDEX_FILE));
        let mut blob = load_metadata(&dir.join(META_FILE));

        if blob.chunks.len() != blob.metadatas.len() {
            tracing::warn!(
                "Metadata blob has {} chunks but {} metadata records; truncating to match",
                blob.chunks.len(),
                blob.metadatas.len()
            );
        }
        let rows = index
            .len()
            .min(blob.chunks.len())
            .min(blob.metadatas.len());
        if index.len() != rows || blob.chunks.len() != rows {
            tracing::warn!(
                "Index has {} rows but metadata has {} chunks; keeping the first {}",
                index.len(),
                blob.chunks.len(),
                rows
            );
        }
        index.truncate(rows);
        blob.chunks.truncate(rows);
        blob.metadatas.truncate(rows);

        tracing::info!("Knowledge base loaded from {} ({} chunks)", dir.display(), rows);

        Self {
            corpus: RwLock::new(Corpus {
                index: Box::new(index),
                chunks: blob.chunks,
                metadatas: blob.metadatas,
            }),
            storage_dir: Some(dir),
        }
    }

    pub async fn len(&self) -> usize {
        self.corpus.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        let corpus = self.corpus.read().await;
        corpus.index.is_empty() || corpus.chunks.is_empty()
    }

    /// Up to `k` candidates, nearest first. An empty store yields nothing.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, ApiError> {
        let corpus = self.corpus.read().await;
        if corpus.index.is_empty() || corpus.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = corpus.index.search(query, k)?;
        let candidates = neighbors
            .into_iter()
            .filter_map(|n| {
                let chunk = corpus.chunks.get(n.row)?;
                let metadata = corpus.metadatas.get(n.row)?;
                Some((chunk.clone(), metadata.clone()))
            })
            .enumerate()
            .map(|(rank, (chunk, metadata))| Candidate::new(rank, chunk, metadata))
            .collect();
        Ok(candidates)
    }

    /// Appends vectors, chunks and metadata together, then persists them if
    /// the store is disk-backed. Returns the new chunk count.
    pub async fn append(
        &self,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<String>,
        metadatas: Vec<Metadata>,
    ) -> Result<usize, ApiError> {
        if vectors.len() != chunks.len() || chunks.len() != metadatas.len() {
            return Err(ApiError::Internal(format!(
                "Append length mismatch: {} vectors, {} chunks, {} metadata records",
                vectors.len(),
                chunks.len(),
                metadatas.len()
            )));
        }

        let mut corpus = self.corpus.write().await;
        let previous = corpus.chunks.len();
        corpus.index.add(&vectors)?;
        corpus.chunks.extend(chunks);
        corpus.metadatas.extend(metadatas);

        if let Some(dir) = &self.storage_dir {
            let persisted = persist(dir.clone(), &corpus).await;
            if let Err(e) = persisted {
                corpus.index.truncate(previous);
                corpus.chunks.truncate(previous);
                corpus.metadatas.truncate(previous);
                return Err(e);
            }
        }

        Ok(corpus.chunks.len())
    }
}

fn load_index(path: &Path) -> FlatL2Index {
    if !path.exists() {
        return FlatL2Index::new();
    }
    match FlatL2Index::load(path) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!("Starting with an empty index: {}", e);
            FlatL2Index::new()
        }
    }
}

fn load_metadata(path: &Path) -> MetadataBlob {
    if !path.exists() {
        return MetadataBlob::default();
    }
    let parsed = fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<MetadataBlob>(&bytes).map_err(|e| e.to_string()));
    match parsed {
        Ok(blob) => blob,
        Err(e) => {
            tracing::warn!(
                "Starting with empty metadata, failed to load {}: {}",
                path.display(),
                e
            );
            MetadataBlob::default()
        }
    }
}

async fn persist(dir: PathBuf, corpus: &Corpus) -> Result<(), ApiError> {
    #[derive(Serialize)]
    struct BlobRef<'a> {
        chunks: &'a [String],
        metadatas: &'a [Metadata],
    }

    let index_bytes = corpus.index.to_blob()?;
    let meta_bytes = serde_json::to_vec(&BlobRef {
        chunks: &corpus.chunks,
        metadatas: &corpus.metadatas,
    })
    .map_err(ApiError::internal)?;

    tokio::task::spawn_blocking(move || write_blobs(&dir, &index_bytes, &meta_bytes))
        .await
        .map_err(ApiError::internal)?
}

/// Writes both blobs to temp files before renaming either. Metadata is
/// renamed first: a crash in between leaves it longer than the index, which
/// `open` truncates back to the previous contents.
fn write_blobs(dir: &Path, index_bytes: &[u8], meta_bytes: &[u8]) -> Result<(), ApiError> {
    fs::create_dir_all(dir).map_err(|e| {
        ApiError::Internal(format!("Failed to create {}: {}", dir.display(), e))
    })?;

    let index_path = dir.join(INDEX_FILE);
    let meta_path = dir.join(META_FILE);
    let index_tmp = index_path.with_extension("tmp");
    let meta_tmp = meta_path.with_extension("tmp");

    write_file(&index_tmp, index_bytes)?;
    write_file(&meta_tmp, meta_bytes)?;
    replace_file(&meta_tmp, &meta_path)?;
    replace_file(&index_tmp, &index_path)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
    fs::write(path, bytes)
        .map_err(|e| ApiError::Internal(format!("Failed to write {}: {}", path.display(), e)))
}

fn replace_file(from: &Path, to: &Path) -> Result<(), ApiError> {
    fs::rename(from, to)
        .map_err(|e| ApiError::Internal(format!("Failed to replace {}: {}", to.display(), e)))
}
