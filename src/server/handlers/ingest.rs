use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

const FILE_FIELD: &str = "file";

/// Accepts a multipart upload in the `file` field and adds its text to the
/// knowledge base.
pub async fn embed_user(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart
        .map_err(|_| ApiError::BadRequest("No file part in request".to_string()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.trim().is_empty() {
            return Err(ApiError::BadRequest("No selected file".to_string()));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e.body_text())))?;

        let report = state.ingestor.ingest_upload(&filename, &bytes).await?;
        return Ok(Json(json!({
            "status": "success",
            "chunks": report.chunks,
            "source": report.source
        })));
    }

    Err(ApiError::BadRequest("No file part in request".to_string()))
}
