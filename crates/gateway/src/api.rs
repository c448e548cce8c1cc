//! REST API over the chat service.
//!
//! Endpoints (all take `?username=`, default `default_user`):
//!
//! - `POST /api/users`               — Create a user (or fetch an existing one)
//! - `GET  /api/users/me`            — Current user and profile
//! - `PUT  /api/users/me/onboarding` — Submit onboarding answers
//! - `POST /api/chat`                — Send a message, get the reply
//! - `GET  /api/messages`            — Paged history, newest first
//! - `GET  /api/memories`            — All memories for the user
//! - `POST /api/memories`            — Upsert a memory
//! - `GET  /api/protocols`           — Protocol registry
//! - `POST /api/protocols/seed`      — Insert the built-in protocols

use axum::{
    Router,
    extract::rejection::JsonRejection,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
};
use disha_coach::{AssemblyMetadata, CoachError, MessagePage};
use disha_core::error::StoreError;
use disha_core::memory::{MemoryRecord, NewMemory};
use disha_core::message::{Message, MessageId};
use disha_core::protocol::Protocol;
use disha_core::user::{ProfileUpdate, User};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::SharedState;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the API router. Nest this under "/api".
pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/users", post(create_user_handler))
        .route("/users/me", get(current_user_handler))
        .route("/users/me/onboarding", put(onboarding_handler))
        .route("/chat", post(chat_handler))
        .route("/messages", get(messages_handler))
        .route("/memories", get(list_memories_handler).post(create_memory_handler))
        .route("/protocols", get(list_protocols_handler))
        .route("/protocols/seed", post(seed_protocols_handler))
}

// ── Request / Response types ──────────────────────────────────────────────

fn default_username() -> String {
    "default_user".into()
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default = "default_username")]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_username")]
    pub username: String,
    pub limit: Option<usize>,
    pub before_id: Option<MessageId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextUsed {
    pub onboarding: bool,
    pub protocols: Vec<String>,
    pub memories_count: usize,
    pub history_included: usize,
    pub history_dropped: usize,
    pub prompt_tokens: usize,
    pub degraded: bool,
}

impl From<AssemblyMetadata> for ContextUsed {
    fn from(meta: AssemblyMetadata) -> Self {
        Self {
            onboarding: meta.onboarding,
            protocols: meta.protocols_used,
            memories_count: meta.memories_used,
            history_included: meta.history.included,
            history_dropped: meta.history.dropped,
            prompt_tokens: meta.total_tokens,
            degraded: meta.history.degraded,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub persisted: bool,
    pub user_message: Message,
    pub assistant_message: Option<Message>,
    pub context_used: ContextUsed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedResponse {
    pub status: String,
    pub inserted: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a service error to its HTTP status.
fn coach_error(err: CoachError) -> ApiError {
    let status = match &err {
        CoachError::EmptyMessage | CoachError::MessageTooLong { .. } | CoachError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        CoachError::IncompleteProfile { .. } => StatusCode::CONFLICT,
        CoachError::Store(StoreError::UserNotFound(_)) => StatusCode::NOT_FOUND,
        CoachError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoachError::Provider(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        warn!(error = %err, "Request rejected");
    }
    api_error(status, err.to_string())
}

/// Unwrap a JSON body, reporting bad payloads as 400.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            let status = match rejection.status() {
                StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
                other => other,
            };
            Err(api_error(status, rejection.body_text()))
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn create_user_handler(
    State(state): State<SharedState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let request = json_body(payload)?;
    let user = state
        .service
        .create_user(&request.username, request.full_name)
        .await
        .map_err(coach_error)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn current_user_handler(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .service
        .get_or_create_user(&query.username)
        .await
        .map_err(coach_error)?;
    Ok(Json(user))
}

async fn onboarding_handler(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let answers = json_body(payload)?;
    let user = state
        .service
        .complete_onboarding(&query.username, answers)
        .await
        .map_err(coach_error)?;
    Ok(Json(user))
}

async fn chat_handler(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = json_body(payload)?;
    info!(user = %query.username, message_len = request.message.len(), "api/chat request");

    let outcome = state
        .service
        .send_message(&query.username, &request.message)
        .await
        .map_err(coach_error)?;

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        persisted: outcome.persisted,
        user_message: outcome.user_message,
        assistant_message: outcome.assistant_message,
        context_used: outcome.context.into(),
    }))
}

async fn messages_handler(
    State(state): State<SharedState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagePage>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(state.service.config().gateway.messages_per_page);
    let page = state
        .service
        .history(&query.username, query.before_id, limit)
        .await
        .map_err(coach_error)?;
    Ok(Json(page))
}

async fn list_memories_handler(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<MemoryRecord>>, ApiError> {
    let memories = state
        .service
        .memories(&query.username)
        .await
        .map_err(coach_error)?;
    Ok(Json(memories))
}

async fn create_memory_handler(
    State(state): State<SharedState>,
    Query(query): Query<UserQuery>,
    payload: Result<Json<NewMemory>, JsonRejection>,
) -> Result<(StatusCode, Json<MemoryRecord>), ApiError> {
    let memory = json_body(payload)?;
    let record = state
        .service
        .add_memory(&query.username, memory)
        .await
        .map_err(coach_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_protocols_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Protocol>>, ApiError> {
    let protocols = state.service.protocols().await.map_err(coach_error)?;
    Ok(Json(protocols))
}

async fn seed_protocols_handler(
    State(state): State<SharedState>,
) -> Result<Json<SeedResponse>, ApiError> {
    let inserted = state.service.seed_protocols().await.map_err(coach_error)?;
    Ok(Json(SeedResponse {
        status: "ok".into(),
        inserted,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewayState, build_router};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use disha_coach::{ChatService, FALLBACK_REPLY, Stores};
    use disha_config::AppConfig;
    use disha_core::error::ProviderError;
    use disha_core::provider::{Completion, CompletionRequest, Provider};
    use disha_providers::DemoProvider;
    use disha_store::InMemoryStore;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    // ── Helpers ────────────────────────────────────────────────────────

    struct DownProvider;

    #[async_trait]
    impl Provider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    fn state_with(provider: Arc<dyn Provider>) -> SharedState {
        let mut config = AppConfig::default();
        config.memory.background_extraction = false;
        let service = ChatService::new(Stores::shared(InMemoryStore::new()), provider, config);
        GatewayState::shared(Arc::new(service))
    }

    fn test_state() -> SharedState {
        state_with(Arc::new(DemoProvider::new()))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn onboard(state: &SharedState, username: &str) {
        let app = build_router(state.clone());
        let response = app
            .oneshot(json_request(
                "PUT",
                &format!("/api/users/me/onboarding?username={username}"),
                serde_json::json!({"age": 34, "gender": "female", "weight": 62, "height": 165}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // ── Users ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_user_returns_created() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/users",
                serde_json::json!({"username": "asha", "full_name": "Asha Rao"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let user: User = read_json(response).await;
        assert_eq!(user.username, "asha");
        assert_eq!(user.profile.full_name.as_deref(), Some("Asha Rao"));
        assert!(!user.onboarding_completed);
    }

    #[tokio::test]
    async fn short_username_is_bad_request() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request("POST", "/api/users", serde_json::json!({"username": "ab"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn current_user_defaults_to_default_user() {
        let app = build_router(test_state());
        let response = app.oneshot(get_request("/api/users/me")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let user: User = read_json(response).await;
        assert_eq!(user.username, "default_user");
    }

    #[tokio::test]
    async fn incomplete_onboarding_is_conflict() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/users/me/onboarding?username=asha",
                serde_json::json!({"age": 34}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let err: ErrorResponse = read_json(response).await;
        assert!(err.error.contains("gender"));
    }

    #[tokio::test]
    async fn out_of_range_onboarding_is_bad_request() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/users/me/onboarding?username=asha",
                serde_json::json!({"age": 34, "gender": "f", "weight": 900, "height": 165}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── Chat ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn chat_round_trip() {
        let state = test_state();
        let app = build_router(state.clone());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat?username=asha",
                serde_json::json!({"message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chat: ChatResponse = read_json(response).await;
        assert!(chat.persisted);
        assert!(chat.context_used.onboarding);
        assert_eq!(chat.user_message.content, "hello");
        assert_eq!(chat.assistant_message.unwrap().content, chat.reply);
    }

    #[tokio::test]
    async fn chat_reports_matched_protocols() {
        let state = test_state();
        state.service.seed_protocols().await.unwrap();
        onboard(&state, "asha").await;

        let app = build_router(state.clone());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat?username=asha",
                serde_json::json!({"message": "I have a fever and it's 101F"}),
            ))
            .await
            .unwrap();
        let chat: ChatResponse = read_json(response).await;
        assert_eq!(chat.context_used.protocols, vec!["Fever Management"]);
        assert!(!chat.context_used.onboarding);
    }

    #[tokio::test]
    async fn blank_message_is_bad_request() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat",
                serde_json::json!({"message": "   "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_username_is_bad_request() {
        let state = test_state();
        let app = build_router(state.clone());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat?username=",
                serde_json::json!({"message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.service.find_user("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_message_field_is_bad_request() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request("POST", "/api/chat", serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn provider_failure_is_ok_with_fallback() {
        let state = state_with(Arc::new(DownProvider));
        let app = build_router(state.clone());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/chat?username=asha",
                serde_json::json!({"message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let chat: ChatResponse = read_json(response).await;
        assert!(!chat.persisted);
        assert_eq!(chat.reply, FALLBACK_REPLY);
        assert!(chat.assistant_message.is_none());

        let page = state.service.history("asha", None, 10).await.unwrap();
        assert_eq!(page.total, 1);
    }

    // ── Messages ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn messages_paginate() {
        let state = test_state();
        for text in ["one", "two", "three"] {
            state.service.send_message("asha", text).await.unwrap();
        }

        let app = build_router(state.clone());
        let response = app
            .oneshot(get_request("/api/messages?username=asha&limit=4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page: MessagePage = read_json(response).await;
        assert_eq!(page.messages.len(), 4);
        assert_eq!(page.total, 6);
        assert!(page.has_more);
        let cursor = page.next_cursor.unwrap();

        let app = build_router(state.clone());
        let response = app
            .oneshot(get_request(&format!(
                "/api/messages?username=asha&limit=4&before_id={cursor}"
            )))
            .await
            .unwrap();
        let page: MessagePage = read_json(response).await;
        assert_eq!(page.messages.len(), 2);
        assert!(!page.has_more);
        assert_eq!(page.messages[1].content, "one");
    }

    #[tokio::test]
    async fn messages_limit_out_of_range_is_bad_request() {
        let app = build_router(test_state());
        let response = app
            .oneshot(get_request("/api/messages?limit=101"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── Memories ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn memories_upsert_and_list() {
        let state = test_state();
        for value in ["penicillin", "penicillin and sulfa"] {
            let app = build_router(state.clone());
            let response = app
                .oneshot(json_request(
                    "POST",
                    "/api/memories?username=asha",
                    serde_json::json!({
                        "category": "medical_history",
                        "key": "allergy",
                        "value": value,
                        "importance": 5
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let app = build_router(state.clone());
        let response = app
            .oneshot(get_request("/api/memories?username=asha"))
            .await
            .unwrap();
        let memories: Vec<MemoryRecord> = read_json(response).await;
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].value, "penicillin and sulfa");
    }

    #[tokio::test]
    async fn unknown_memory_category_is_bad_request() {
        let app = build_router(test_state());
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/memories",
                serde_json::json!({"category": "concern", "key": "k", "value": "v"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── Protocols ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn seed_then_list_protocols() {
        let state = test_state();
        let app = build_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/protocols/seed")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let seeded: SeedResponse = read_json(response).await;
        assert_eq!(seeded.inserted, 5);

        let app = build_router(state.clone());
        let response = app.oneshot(get_request("/api/protocols")).await.unwrap();
        let protocols: Vec<Protocol> = read_json(response).await;
        assert_eq!(protocols.len(), 5);
        assert_eq!(protocols[0].name, "Emergency Symptoms");
    }
}
