//! Question answering: classify, retrieve, select, compose, generate.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::context::history::ConversationTurn;
use crate::context::prompt::compose_prompt;
use crate::core::config::{LlmSettings, RetrievalSettings};
use crate::core::errors::ApiError;
use crate::llm::{EmbeddingProvider, LlmProvider};
use crate::rag::intent::Intent;
use crate::rag::selector::ContextSelector;
use crate::rag::store::KnowledgeBase;

pub mod attachment;

/// Result of answering one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub intent: Intent,
    pub used_sources: Vec<String>,
    pub updated_history: Vec<ConversationTurn>,
}

pub struct QueryService {
    knowledge: Arc<KnowledgeBase>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    selector: ContextSelector,
    top_k: usize,
    llm_timeout: Duration,
}

impl QueryService {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        retrieval: &RetrievalSettings,
        llm_settings: &LlmSettings,
    ) -> Self {
        Self {
            knowledge,
            embedder,
            llm,
            selector: ContextSelector::new(retrieval.preferred_domains.clone())
                .with_max_entries(retrieval.max_context),
            top_k: retrieval.top_k,
            llm_timeout: llm_settings.timeout(),
        }
    }

    /// Answers `question` in the context of `history`.
    ///
    /// A missing, empty or whitespace-only question is a client error and no
    /// collaborator is called. An
    /// embedding failure is returned as an error; a language-model failure
    /// becomes the answer text so the caller still gets a full outcome.
    pub async fn handle(
        &self,
        question: &str,
        mut history: Vec<ConversationTurn>,
    ) -> Result<QueryOutcome, ApiError> {
        if question.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "Missing required field: question".to_string(),
            ));
        }

        let intent = Intent::classify(question);

        let candidates = if self.knowledge.is_empty().await {
            Vec::new()
        } else {
            let query_vector = self.embedder.embed_one(question).await?;
            self.knowledge.search(&query_vector, self.top_k).await?
        };

        let selection = self.selector.select(&candidates);
        let context = selection.context_blocks();
        let used_sources = selection.used_sources();

        tracing::info!(
            "Query intent={} candidates={} selected={} sources={}",
            intent,
            candidates.len(),
            selection.len(),
            used_sources.len()
        );

        let prompt = compose_prompt(&history, &context, question, intent, &used_sources);
        let answer = self.generate_answer(&prompt).await;

        history.push(ConversationTurn::user(question));
        history.push(ConversationTurn::assistant(answer.clone()));

        Ok(QueryOutcome {
            answer,
            intent,
            used_sources,
            updated_history: history,
        })
    }

    async fn generate_answer(&self, prompt: &str) -> String {
        let result = tokio::time::timeout(self.llm_timeout, self.llm.generate(prompt)).await;
        match result {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!("LLM request via {} failed: {}", self.llm.name(), e);
                format!("LLM request failed: {}", e)
            }
            Err(_) => {
                tracing::warn!(
                    "LLM request via {} timed out after {:?}",
                    self.llm.name(),
                    self.llm_timeout
                );
                format!(
                    "LLM request failed: timed out after {} seconds",
                    self.llm_timeout.as_secs()
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::Metadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Maps known phrases to fixed 2-d vectors; counts calls.
    #[derive(Default)]
    struct FakeEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().map(|_| vec![0.0, 0.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Err(ApiError::Internal("connection refused".to_string()))
        }
    }

    /// Records prompts and replies with a canned answer or error.
    struct FakeLlm {
        reply: Result<String, String>,
        delay: Option<Duration>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeLlm {
        fn answering(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                delay: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                delay: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone().map_err(ApiError::Internal)
        }
    }

    async fn seeded_kb(entries: &[(&str, &str, [f32; 2])]) -> Arc<KnowledgeBase> {
        let kb = Arc::new(KnowledgeBase::in_memory());
        if !entries.is_empty() {
            kb.append(
                entries.iter().map(|(_, _, v)| v.to_vec()).collect(),
                entries.iter().map(|(c, _, _)| c.to_string()).collect(),
                entries.iter().map(|(_, s, _)| Metadata::with_source(*s)).collect(),
            )
            .await
            .unwrap();
        }
        kb
    }

    fn service(
        kb: Arc<KnowledgeBase>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> QueryService {
        QueryService::new(
            kb,
            embedder,
            llm,
            &RetrievalSettings::default(),
            &LlmSettings {
                timeout_secs: 1,
                ..LlmSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn blank_question_is_rejected_before_any_call() {
        let embedder = Arc::new(FakeEmbedder::default());
        let llm = Arc::new(FakeLlm::answering("unused"));
        let kb = seeded_kb(&[("A", "www.gov.uk/x", [0.0, 0.0])]).await;
        let svc = service(kb, embedder.clone(), llm.clone());

        let err = svc.handle("   ", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_knowledge_base_still_answers_without_embedding() {
        let embedder = Arc::new(FakeEmbedder::default());
        let llm = Arc::new(FakeLlm::answering("I have no documents on that."));
        let svc = service(seeded_kb(&[]).await, embedder.clone(), llm.clone());

        let outcome = svc.handle("What is a lease?", Vec::new()).await.unwrap();

        assert_eq!(outcome.answer, "I have no documents on that.");
        assert_eq!(outcome.intent, Intent::Definition);
        assert!(outcome.used_sources.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(llm.last_prompt().ends_with("**Sources Used**:"));
    }

    #[tokio::test]
    async fn retrieval_prefers_domains_and_fills_by_rank() {
        let kb = seeded_kb(&[
            ("Chunk A", "www.gov.uk/x", [0.1, 0.0]),
            ("Chunk B", "www.gov.uk/x", [0.2, 0.0]),
            ("Chunk C", "example.com", [0.3, 0.0]),
        ])
        .await;
        let llm = Arc::new(FakeLlm::answering("You need the title deeds."));
        let svc = service(kb, Arc::new(FakeEmbedder::default()), llm.clone());

        let outcome = svc
            .handle("What documents do I need to register a property?", Vec::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.used_sources,
            vec!["www.gov.uk/x".to_string(), "example.com".to_string()]
        );
        let prompt = llm.last_prompt();
        let a = prompt.find("--- Source 1: www.gov.uk/x ---\nChunk A").unwrap();
        let b = prompt.find("--- Source 2: www.gov.uk/x ---\nChunk B").unwrap();
        let c = prompt.find("--- Source 3: example.com ---\nChunk C").unwrap();
        assert!(a < b && b < c);
        assert!(prompt.ends_with("- www.gov.uk/x\n- example.com"));
    }

    #[tokio::test]
    async fn history_gains_the_new_turn_pair() {
        let llm = Arc::new(FakeLlm::answering("Section 1 of the Act."));
        let svc = service(seeded_kb(&[]).await, Arc::new(FakeEmbedder::default()), llm.clone());
        let history = vec![
            ConversationTurn::user("Hi"),
            ConversationTurn::assistant("Hello, how can I help?"),
        ];

        let outcome = svc
            .handle("Which law covers this?", history.clone())
            .await
            .unwrap();

        assert_eq!(outcome.intent, Intent::LegalReference);
        assert_eq!(outcome.updated_history.len(), 4);
        assert_eq!(&outcome.updated_history[..2], &history[..]);
        assert_eq!(
            outcome.updated_history[2],
            ConversationTurn::user("Which law covers this?")
        );
        assert_eq!(
            outcome.updated_history[3],
            ConversationTurn::assistant("Section 1 of the Act.")
        );
        assert!(llm.last_prompt().contains("User: Hi\nAssistant: Hello, how can I help?\n"));
    }

    #[tokio::test]
    async fn llm_failure_becomes_the_answer() {
        let llm = Arc::new(FakeLlm::failing("503 Service Unavailable"));
        let svc = service(seeded_kb(&[]).await, Arc::new(FakeEmbedder::default()), llm);

        let outcome = svc.handle("Hello", Vec::new()).await.unwrap();
        assert!(outcome.answer.starts_with("LLM request failed:"));
        assert!(outcome.answer.contains("503"));
        assert_eq!(outcome.updated_history[1].content, outcome.answer);
    }

    #[tokio::test(start_paused = true)]
    async fn llm_timeout_becomes_the_answer() {
        let llm = Arc::new(FakeLlm {
            reply: Ok("too late".to_string()),
            delay: Some(Duration::from_secs(30)),
            prompts: Mutex::new(Vec::new()),
        });
        let svc = service(seeded_kb(&[]).await, Arc::new(FakeEmbedder::default()), llm);

        let outcome = svc.handle("Hello", Vec::new()).await.unwrap();
        assert_eq!(outcome.answer, "LLM request failed: timed out after 1 seconds");
    }

    #[tokio::test]
    async fn embedding_failure_is_a_server_error() {
        let kb = seeded_kb(&[("A", "a.txt", [0.0, 0.0])]).await;
        let llm = Arc::new(FakeLlm::answering("unused"));
        let svc = service(kb, Arc::new(FailingEmbedder), llm.clone());

        let err = svc.handle("Hello", Vec::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }
}
