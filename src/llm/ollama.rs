use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::provider::{EmbeddingProvider, LlmProvider};
use super::types::{EmbedRequest, EmbedResponse, GenerateRequest, GenerateResponse};
use crate::core::config::{EmbeddingSettings, LlmSettings};
use crate::core::errors::ApiError;

fn build_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ApiError::internal)
}

/// Text generation through Ollama's `/api/generate`. Image prompts go to
/// the separate vision model.
#[derive(Clone)]
pub struct OllamaGenerator {
    endpoint: String,
    model: String,
    vision_model: String,
    temperature: f32,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(settings: &LlmSettings) -> Result<Self, ApiError> {
        Ok(Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            vision_model: settings.vision_model.clone(),
            temperature: settings.temperature,
            client: build_client(settings.timeout())?,
        })
    }

    async fn post_generate(
        &self,
        model: &str,
        prompt: &str,
        images: Option<&[String]>,
    ) -> Result<String, ApiError> {
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
            temperature: self.temperature,
            images,
        };

        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Ollama generate error ({}): {}",
                status, text
            )));
        }

        let payload: GenerateResponse = res.json().await.map_err(ApiError::internal)?;
        Ok(payload.response.trim().to_string())
    }
}

#[async_trait]
impl LlmProvider for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        self.post_generate(&self.model, prompt, None).await
    }

    async fn generate_with_images(
        &self,
        prompt: &str,
        images: &[String],
    ) -> Result<String, ApiError> {
        self.post_generate(&self.vision_model, prompt, Some(images)).await
    }
}

/// Embeddings through Ollama's `/api/embed`.
#[derive(Clone)]
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, ApiError> {
        Ok(Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            client: build_client(settings.timeout())?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbedRequest {
            model: &self.model,
            input: inputs,
        };

        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Internal(format!("Embedding request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Ollama embed error ({}): {}",
                status, text
            )));
        }

        let payload: EmbedResponse = res.json().await.map_err(ApiError::internal)?;
        if payload.embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "Ollama returned {} embeddings for {} inputs",
                payload.embeddings.len(),
                inputs.len()
            )));
        }

        Ok(payload.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    async fn spawn(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn llm_settings(endpoint: String, timeout_secs: u64) -> LlmSettings {
        LlmSettings {
            endpoint,
            timeout_secs,
            ..LlmSettings::default()
        }
    }

    #[tokio::test]
    async fn generate_posts_expected_body_and_trims_response() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llama3");
                assert_eq!(body["stream"], false);
                assert!(body["prompt"].as_str().unwrap().contains("Question"));
                assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
                Json(json!({ "response": "  The answer.\n" }))
            }),
        );
        let base = spawn(app).await;

        let llm = OllamaGenerator::new(&llm_settings(format!("{base}/api/generate"), 5)).unwrap();
        let answer = llm.generate("Question: ?").await.unwrap();
        assert_eq!(answer, "The answer.");
    }

    #[tokio::test]
    async fn generate_surfaces_non_success_status() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model loading") }),
        );
        let base = spawn(app).await;

        let llm = OllamaGenerator::new(&llm_settings(format!("{base}/api/generate"), 5)).unwrap();
        let err = llm.generate("hi").await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("model loading"));
    }

    #[tokio::test]
    async fn images_go_to_the_vision_model() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llava");
                assert_eq!(body["images"], json!(["aGVsbG8="]));
                Json(json!({ "response": "A scanned title deed." }))
            }),
        );
        let base = spawn(app).await;

        let llm = OllamaGenerator::new(&llm_settings(format!("{base}/api/generate"), 5)).unwrap();
        let answer = llm
            .generate_with_images("Describe this", &["aGVsbG8=".to_string()])
            .await
            .unwrap();
        assert_eq!(answer, "A scanned title deed.");
    }

    #[tokio::test]
    async fn text_prompts_omit_the_images_field() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert!(body.get("images").is_none());
                Json(json!({ "response": "ok" }))
            }),
        );
        let base = spawn(app).await;

        let llm = OllamaGenerator::new(&llm_settings(format!("{base}/api/generate"), 5)).unwrap();
        assert_eq!(llm.generate("plain").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn generate_fails_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let llm =
            OllamaGenerator::new(&llm_settings(format!("http://{addr}/api/generate"), 2)).unwrap();
        assert!(llm.generate("hi").await.is_err());
    }

    #[tokio::test]
    async fn embed_returns_vectors_in_input_order() {
        let app = Router::new().route(
            "/api/embed",
            post(|Json(body): Json<Value>| async move {
                let inputs = body["input"].as_array().unwrap().clone();
                let embeddings: Vec<Vec<f32>> = inputs
                    .iter()
                    .map(|v| vec![v.as_str().unwrap().len() as f32, 1.0])
                    .collect();
                Json(json!({ "embeddings": embeddings }))
            }),
        );
        let base = spawn(app).await;

        let embedder = OllamaEmbedder::new(&EmbeddingSettings {
            endpoint: format!("{base}/api/embed"),
            ..EmbeddingSettings::default()
        })
        .unwrap();

        let vectors = embedder
            .embed(&["a".to_string(), "abc".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0]]);

        let single = embedder.embed_one("abcd").await.unwrap();
        assert_eq!(single, vec![4.0, 1.0]);
    }

    #[tokio::test]
    async fn embed_rejects_count_mismatch() {
        let app = Router::new().route(
            "/api/embed",
            post(|| async { Json(json!({ "embeddings": [] })) }),
        );
        let base = spawn(app).await;

        let embedder = OllamaEmbedder::new(&EmbeddingSettings {
            endpoint: format!("{base}/api/embed"),
            ..EmbeddingSettings::default()
        })
        .unwrap();
        assert!(embedder.embed(&["x".to_string()]).await.is_err());
    }
}
