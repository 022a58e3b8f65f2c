use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::llm::{EmbeddingProvider, LlmProvider, OllamaEmbedder, OllamaGenerator};
use crate::query::QueryService;
use crate::rag::chunker::{ChunkerConfig, TextChunker};
use crate::rag::ingest::Ingestor;
use crate::rag::store::KnowledgeBase;

pub mod error;

use error::InitializationError;

/// Process-wide state shared by every request handler.
///
/// Holds:
/// - Paths and the loaded settings
/// - The knowledge base (index + chunk metadata)
/// - The query pipeline and the ingestion pipeline, both wired to the same
///   knowledge base and embedding provider
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub knowledge: Arc<KnowledgeBase>,
    pub query: Arc<QueryService>,
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Load `config.yml` relative to `paths`
    /// 2. Open the on-disk knowledge base (empty when absent)
    /// 3. Build the Ollama generation and embedding clients
    ///
    /// Logging should already be installed so load-time repairs of the
    /// knowledge base are recorded.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let knowledge = Arc::new(KnowledgeBase::open(config.index_dir(&settings)));

        let llm: Arc<dyn LlmProvider> = Arc::new(
            OllamaGenerator::new(&settings.llm).map_err(|e| InitializationError::Llm(e.into()))?,
        );
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
            OllamaEmbedder::new(&settings.embedding)
                .map_err(|e| InitializationError::Embedding(e.into()))?,
        );

        let upload_dir = config.upload_dir(&settings);
        Ok(Arc::new(Self::from_parts(
            paths,
            settings,
            knowledge,
            embedder,
            llm,
            Some(upload_dir),
        )))
    }

    /// Wires the pipelines from explicit collaborators. Accepted uploads are
    /// copied into `upload_dir` when one is given.
    pub fn from_parts(
        paths: Arc<AppPaths>,
        settings: Settings,
        knowledge: Arc<KnowledgeBase>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        upload_dir: Option<PathBuf>,
    ) -> Self {
        let query = QueryService::new(
            knowledge.clone(),
            embedder.clone(),
            llm,
            &settings.retrieval,
            &settings.llm,
        );
        let mut ingestor = Ingestor::new(
            knowledge.clone(),
            embedder,
            TextChunker::new(ChunkerConfig::from(&settings.ingestion)),
        );
        if let Some(dir) = upload_dir {
            ingestor = ingestor.with_upload_dir(dir);
        }

        Self {
            paths,
            settings: Arc::new(settings),
            knowledge,
            query: Arc::new(query),
            ingestor: Arc::new(ingestor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::Metadata;

    #[tokio::test]
    async fn initialize_opens_the_knowledge_base_under_the_given_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::from_data_dir(
            tmp.path().to_path_buf(),
            tmp.path().join("data"),
        ));
        KnowledgeBase::open(paths.index_dir.clone())
            .append(
                vec![vec![1.0, 0.0]],
                vec!["Leasehold runs for a fixed term.".to_string()],
                vec![Metadata::with_source("www.gov.uk/leasehold")],
            )
            .await
            .unwrap();

        let state = AppState::initialize(paths.clone()).await.unwrap();

        assert!(Arc::ptr_eq(&state.paths, &paths));
        assert_eq!(state.knowledge.len().await, 1);
    }
}
