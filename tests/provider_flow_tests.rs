use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use axum_test::TestServer;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use studygen::api::{AppState, create_router};
use studygen::config::LlmConfig;
use studygen::{
    FlashcardItem, HistoryStore, LlmError, McqItem, McqSessionStore, OpenRouterClient, StudyService,
};

fn llm_config(endpoint: String, max_retries: u32) -> LlmConfig {
    LlmConfig {
        api_key: "test-key".to_string(),
        endpoint,
        model: "openai/gpt-4o-mini".to_string(),
        max_retries,
        max_tokens: 1200,
        app_origin: "http://localhost:3000".to_string(),
        app_name: "EduCator".to_string(),
    }
}

/// Serve a stub OpenRouter on an ephemeral port, returning the endpoint URL.
async fn spawn_provider(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/api/v1/chat/completions", addr)
}

fn envelope(content: &str) -> Value {
    json!({"choices": [{"message": {"content": content}}]})
}

fn mcq_items(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|_| {
            json!({
                "question": "Where is the Eiffel Tower?",
                "options": ["Paris", "Rome", "Berlin", "Madrid"],
                "answer": "A"
            })
        })
        .collect();
    Value::Array(items)
}

fn flashcard_items(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({"front": format!("Term {}", i), "back": format!("Definition {}", i)}))
        .collect();
    Value::Array(items)
}

/// Stub that answers each of the three generation prompts appropriately.
fn full_study_set_provider() -> Router {
    Router::new().route(
        "/api/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            let prompt = body["messages"][0]["content"].as_str().unwrap_or("");
            let content = if prompt.contains("MCQs") {
                mcq_items(10).to_string()
            } else if prompt.contains("flashcards") {
                flashcard_items(10).to_string()
            } else {
                "- The Eiffel Tower is in Paris.\n- It was completed in 1889.".to_string()
            };
            Json(envelope(&content))
        }),
    )
}

/// Stub that always returns the same content string.
fn fixed_content_provider(content: String) -> Router {
    Router::new().route(
        "/api/v1/chat/completions",
        post(move || {
            let content = content.clone();
            async move { Json(envelope(&content)) }
        }),
    )
}

async fn build_app(endpoint: String) -> (TestServer, McqSessionStore) {
    let sessions = McqSessionStore::new(3600);
    let llm = OpenRouterClient::new(&llm_config(endpoint, 2)).unwrap();
    let study_service = StudyService::new(llm, sessions.clone());
    let history = HistoryStore::new("sqlite::memory:").await.unwrap();

    let server = TestServer::new(create_router(AppState {
        study_service,
        history,
    }))
    .unwrap();
    (server, sessions)
}

#[tokio::test]
async fn test_end_to_end_generate_then_verify() {
    let endpoint = spawn_provider(full_study_set_provider()).await;
    let (server, _) = build_app(endpoint).await;

    let response = server
        .post("/api/generate/study-set")
        .json(&json!({"text": "The Eiffel Tower is in Paris."}))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["mcqs"].as_array().unwrap().len(), 10);
    assert_eq!(body["flashcards"].as_array().unwrap().len(), 10);
    assert!(body["summary"].as_str().unwrap().contains("Paris"));
    let mcq_set_id = body["mcqSetId"].as_str().unwrap().to_string();
    assert!(!mcq_set_id.is_empty());

    let verdict = server
        .post("/api/verify/mcq")
        .json(&json!({"mcqSetId": mcq_set_id, "questionIndex": 0, "selectedAnswer": "Paris"}))
        .await;
    verdict.assert_status_ok();

    let verdict_body: Value = verdict.json();
    assert_eq!(verdict_body["is_correct"], true);
    assert_eq!(verdict_body["correct_index"], 0);
    assert_eq!(verdict_body["correct_option"], "Paris");
}

#[tokio::test]
async fn test_generation_fails_upstream_on_short_item_list() {
    let endpoint = spawn_provider(fixed_content_provider(mcq_items(7).to_string())).await;
    let client = OpenRouterClient::new(&llm_config(endpoint, 2)).unwrap();

    let result = client
        .generate_items_from_source::<McqItem>("source", "Create exactly 10 MCQs.", 10)
        .await;

    match result {
        Err(LlmError::TooFewItems { expected, got }) => {
            assert_eq!(expected, 10);
            assert_eq!(got, 7);
        }
        other => panic!("expected TooFewItems, got {:?}", other.map(|v| v.len())),
    }
}

#[tokio::test]
async fn test_generation_truncates_extra_items() {
    let endpoint = spawn_provider(fixed_content_provider(mcq_items(12).to_string())).await;
    let client = OpenRouterClient::new(&llm_config(endpoint, 2)).unwrap();

    let items = client
        .generate_items_from_source::<McqItem>("source", "Create exactly 10 MCQs.", 10)
        .await
        .unwrap();
    assert_eq!(items.len(), 10);
}

#[tokio::test]
async fn test_generation_tolerates_fenced_output() {
    let fenced = format!("```json\n{}\n```", flashcard_items(10));
    let endpoint = spawn_provider(fixed_content_provider(fenced)).await;
    let client = OpenRouterClient::new(&llm_config(endpoint, 2)).unwrap();

    let items = client
        .generate_items_from_source::<FlashcardItem>("source", "Create exactly 10 flashcards.", 10)
        .await
        .unwrap();
    assert_eq!(items.len(), 10);
    assert_eq!(items[0].front, "Term 0");
}

#[tokio::test]
async fn test_rate_limited_call_retries_after_hinted_delay() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_route = hits.clone();
    let router = Router::new().route(
        "/api/v1/chat/completions",
        post(move || {
            let hits = hits_for_route.clone();
            async move {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        [("Retry-After", "2")],
                        "rate limited".to_string(),
                    )
                        .into_response()
                } else {
                    Json(envelope("all good")).into_response()
                }
            }
        }),
    );

    let endpoint = spawn_provider(router).await;
    let client = OpenRouterClient::new(&llm_config(endpoint, 2)).unwrap();

    let started = Instant::now();
    let body = client.call("prompt").await.unwrap();
    let elapsed = started.elapsed();

    assert!(body.contains("all good"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(
        elapsed >= Duration::from_secs(2),
        "retry should wait at least the Retry-After delay, waited {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_zero_quota_rate_limit_is_terminal() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_route = hits.clone();
    let router = Router::new().route(
        "/api/v1/chat/completions",
        post(move || {
            let hits = hits_for_route.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Rate limit exceeded (limit: 0, remaining: 0)".to_string(),
                )
            }
        }),
    );

    let endpoint = spawn_provider(router).await;
    let client = OpenRouterClient::new(&llm_config(endpoint, 2)).unwrap();

    let err = client.call("prompt").await.unwrap_err();
    assert!(matches!(err, LlmError::QuotaExhausted));
    // No retry cycle is spent on a key that has no credits.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_rate_limit_errors_are_not_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_route = hits.clone();
    let router = Router::new().route(
        "/api/v1/chat/completions",
        post(move || {
            let hits = hits_for_route.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded".to_string())
            }
        }),
    );

    let endpoint = spawn_provider(router).await;
    let client = OpenRouterClient::new(&llm_config(endpoint, 2)).unwrap();

    let err = client.call("prompt").await.unwrap_err();
    match err {
        LlmError::Provider { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("upstream exploded"));
        }
        other => panic!("expected Provider error, got {:?}", other),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generate_endpoint_maps_provider_failure_to_502() {
    let router = Router::new().route(
        "/api/v1/chat/completions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()) }),
    );
    let endpoint = spawn_provider(router).await;
    let (server, _) = build_app(endpoint).await;

    let response = server
        .post("/api/generate/study-set")
        .json(&json!({"text": "notes"}))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("boom"));
}
