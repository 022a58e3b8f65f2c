use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::context::history::ConversationTurn;
use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: Option<String>,
    pub history: Option<Vec<ConversationTurn>>,
}

/// Answers a question against the knowledge base. `question` must be
/// present and contain more than whitespace, otherwise the request is a 400
/// `Missing required field: question`. `history` defaults to empty.
pub async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let question = payload.question.unwrap_or_default();
    let history = payload.history.unwrap_or_default();

    let request_id = Uuid::new_v4();
    tracing::debug!(
        "Query {} received ({} history turns)",
        request_id,
        history.len()
    );

    let outcome = state.query.handle(&question, history).await?;
    tracing::debug!("Query {} answered with intent {}", request_id, outcome.intent);

    Ok(Json(json!({
        "status": "success",
        "answer": outcome.answer,
        "used_sources": outcome.used_sources,
        "updated_history": outcome.updated_history
    })))
}
