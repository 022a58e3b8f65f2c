pub mod ollama;
pub mod provider;
pub mod types;

pub use ollama::{OllamaEmbedder, OllamaGenerator};
pub use provider::{EmbeddingProvider, LlmProvider};
