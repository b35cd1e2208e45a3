use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    errors::{ApiError, ErrorBody},
    history::HistoryStore,
    models::{McqVerdict, StudySet},
    study_service::StudyService,
};

const DEFAULT_HISTORY_LIMIT: u32 = 20;
const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub study_service: StudyService,
    pub history: HistoryStore,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

/// Pick the source text out of a generate request: either inline `text` or
/// `extractedText` produced by an external document-extraction step, never
/// both and never neither.
fn source_text_from_payload(payload: &Value) -> Result<String, ApiError> {
    let text = payload
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();
    let extracted = payload
        .get("extractedText")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();

    match (text.is_empty(), extracted.is_empty()) {
        (false, false) => Err(ApiError::BadRequest(
            "Provide either text or extractedText, not both".to_string(),
        )),
        (false, true) => Ok(text.to_string()),
        (true, false) => Ok(extracted.to_string()),
        (true, true) => Err(ApiError::BadRequest(
            "Provide text or extractedText".to_string(),
        )),
    }
}

pub async fn generate_study_set(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<StudySet> {
    let source_text = source_text_from_payload(&payload)
        .map_err(|e| e.into_response("generate_study_set"))?;

    info!(
        source_length = source_text.len(),
        "Generate study set requested"
    );

    match state.study_service.generate_study_set(&source_text).await {
        Ok(study_set) => Ok(Json(study_set)),
        Err(e) => Err(e.into_response("generate_study_set")),
    }
}

pub async fn verify_mcq(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<McqVerdict> {
    let operation = "verify_mcq";

    let mcq_set_id = payload
        .get("mcqSetId")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    if mcq_set_id.is_empty() {
        return Err(
            ApiError::BadRequest("mcqSetId is required".to_string()).into_response(operation)
        );
    }

    let Some(question_index) = payload.get("questionIndex").and_then(Value::as_i64) else {
        return Err(
            ApiError::BadRequest("questionIndex must be an integer".to_string())
                .into_response(operation),
        );
    };

    let selected_answer = payload
        .get("selectedAnswer")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    if selected_answer.is_empty() {
        return Err(
            ApiError::BadRequest("selectedAnswer is required".to_string())
                .into_response(operation),
        );
    }

    match state
        .study_service
        .verify_answer(&mcq_set_id, question_index, &selected_answer)
        .await
    {
        Ok(verdict) => {
            info!(
                mcq_set_id = %mcq_set_id,
                question_index,
                is_correct = verdict.is_correct,
                "Answer verified"
            );
            Ok(Json(verdict))
        }
        Err(e) => Err(e.into_response(operation)),
    }
}

// History endpoints. Failures here keep the original soft contract: the
// study flow must never break because history storage is unavailable.

pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Value> {
    let limit = params
        .limit
        .as_deref()
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    match state.history.list(limit).await {
        Ok(items) => Json(json!({ "items": items })),
        Err(e) => {
            warn!(error = %e, "Failed to list study session history");
            Json(json!({ "items": [], "message": format!("History error: {}", e) }))
        }
    }
}

pub async fn save_session_history(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    let session_id = state.history.save(&payload).await;
    Json(json!({ "sessionId": session_id, "stored": session_id.is_some() }))
}

pub async fn clear_history(State(state): State<AppState>) -> Json<Value> {
    match state.history.clear().await {
        Ok(cleared) => Json(json!({ "cleared": cleared })),
        Err(e) => {
            warn!(error = %e, "Failed to clear study session history");
            Json(json!({ "cleared": 0, "message": format!("History error: {}", e) }))
        }
    }
}

pub async fn delete_history_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Value> {
    match state.history.delete(&id).await {
        Ok(deleted) => Json(json!({ "deleted": deleted })),
        Err(e) => {
            warn!(history_id = %id, error = %e, "Failed to delete history item");
            Json(json!({ "deleted": false, "message": format!("History error: {}", e) }))
        }
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Backend is running" }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        // Study set generation and verification
        .route("/api/generate/study-set", post(generate_study_set))
        .route("/api/verify/mcq", post(verify_mcq))
        // Study session history
        .route("/api/history", get(get_history))
        .route("/api/history/session", post(save_session_history))
        .route("/api/history/clear", post(clear_history))
        .route("/api/history/:id", delete(delete_history_item))
        .with_state(state)
}
