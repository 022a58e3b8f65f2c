//! Retrieval: intent classification, chunking, the vector index and the
//! knowledge base it backs, and context selection.

pub mod chunker;
pub mod index;
pub mod ingest;
pub mod intent;
pub mod selector;
pub mod store;

pub use chunker::{ChunkerConfig, TextChunk, TextChunker};
pub use index::{FlatL2Index, Neighbor, VectorIndex};
pub use ingest::{IngestReport, Ingestor};
pub use intent::Intent;
pub use selector::{ContextBlock, ContextSelector, Selection};
pub use store::{Candidate, KnowledgeBase, Metadata};
