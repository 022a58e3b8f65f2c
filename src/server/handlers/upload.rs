use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

const IMAGE_FIELD: &str = "image";
const PROMPT_FIELD: &str = "prompt";

/// Answers a question about an uploaded image without adding it to the
/// knowledge base. Multipart fields: `image` (file) and optional `prompt`.
pub async fn upload_and_query(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart
        .map_err(|_| ApiError::BadRequest("No file part in the request".to_string()))?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut prompt: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read file: {}", e.body_text()))
                })?;
                file = Some((filename, bytes.to_vec()));
            }
            Some(PROMPT_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                prompt = Some(text);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("No file part in the request".to_string()))?;
    let answer = state
        .query
        .handle_file(&filename, &bytes, prompt.as_deref())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "response": answer
    })))
}
