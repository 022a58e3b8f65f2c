use async_trait::async_trait;

use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider name used in logs (e.g. "ollama")
    fn name(&self) -> &str;

    /// single non-streaming completion for a fully rendered prompt
    async fn generate(&self, prompt: &str) -> Result<String, ApiError>;

    /// completion over base64-encoded images; providers without a vision
    /// model refuse
    async fn generate_with_images(
        &self,
        _prompt: &str,
        _images: &[String],
    ) -> Result<String, ApiError> {
        Err(ApiError::ServiceUnavailable(format!(
            "{} has no vision model configured",
            self.name()
        )))
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// one vector per input, in input order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed_one(&self, input: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Internal(format!("{} returned no embedding", self.name())))
    }
}
