//! One-off questions about an uploaded image. Nothing is stored.

use std::path::Path;

use base64::Engine;

use super::QueryService;
use crate::core::errors::ApiError;

pub const DEFAULT_FILE_PROMPT: &str = "Summarize this file.";

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

impl QueryService {
    /// Asks the vision model `prompt` about an image. PDFs and other types
    /// are rejected as unsupported; model failures are server errors.
    pub async fn handle_file(
        &self,
        filename: &str,
        bytes: &[u8],
        prompt: Option<&str>,
    ) -> Result<String, ApiError> {
        if filename.trim().is_empty() {
            return Err(ApiError::BadRequest("No file selected".to_string()));
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            let shown = if extension.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{}", extension)
            };
            return Err(ApiError::BadRequest(format!(
                "Unsupported file type for querying: {}",
                shown
            )));
        }
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("File is empty".to_string()));
        }

        let prompt = prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_FILE_PROMPT);
        let images = [base64::engine::general_purpose::STANDARD.encode(bytes)];

        let result = tokio::time::timeout(
            self.llm_timeout,
            self.llm.generate_with_images(prompt, &images),
        )
        .await;
        match result {
            Ok(Ok(answer)) => {
                tracing::info!("Answered image query on {} ({} bytes)", filename, bytes.len());
                Ok(answer)
            }
            Ok(Err(ApiError::ServiceUnavailable(msg))) => Err(ApiError::ServiceUnavailable(msg)),
            Ok(Err(e)) => Err(ApiError::Internal(format!("Failed to process image: {}", e))),
            Err(_) => Err(ApiError::Internal(format!(
                "Failed to process image: timed out after {} seconds",
                self.llm_timeout.as_secs()
            ))),
        }
    }
}
