//! Precis HTTP API
//!
//! Axum-based HTTP server for summarization and history.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function. The inner functions are directly testable without the axum
//! dispatch machinery.
//!
//! Endpoints:
//! - POST /summarize — summarize `{ "text": ... }` and record it in history
//! - GET  /history   — full history, newest first
//! - GET  /health    — history file status
//! - GET  /version   — server version info

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use precis_core::PrecisConfig;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::subsystems::summarize::{GatewayError, SummarizationGateway};

/// Set on every successful `/summarize` response: `saved` or `failed`.
pub static HISTORY_HEADER: HeaderName = HeaderName::from_static("x-precis-history");

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub gateway: SummarizationGateway,
    pub config: PrecisConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = state.config.http.body_limit_bytes;
    let cors = cors_layer(&state.config.http.cors_origins);

    Router::new()
        .route("/summarize", post(summarize_handler))
        .route("/history", get(history_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` anywhere in the list opens CORS to every origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods(Any)
    } else {
        let origins = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect::<Vec<_>>();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_headers(Any)
            .allow_methods(Any)
    }
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = state.config.listen_addr();

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Precis HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Chat-completion shaped body returned by `/summarize`.
#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Serialize)]
pub struct ChoiceMessage {
    pub content: String,
}

impl SummarizeResponse {
    pub fn new(summary: String) -> Self {
        Self {
            choices: vec![Choice {
                message: ChoiceMessage { content: summary },
            }],
        }
    }
}

/// `/summarize` outcome before it is turned into a response.
#[derive(Debug)]
pub struct SummarizeReply {
    pub status: StatusCode,
    pub body: serde_json::Value,
    /// `Some` only when a summary was produced.
    pub history_saved: Option<bool>,
}

impl IntoResponse for SummarizeReply {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(saved) = self.history_saved {
            let value = if saved { "saved" } else { "failed" };
            response
                .headers_mut()
                .insert(HISTORY_HEADER.clone(), HeaderValue::from_static(value));
        }
        response
    }
}

pub fn gateway_error_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation => StatusCode::BAD_REQUEST,
        GatewayError::Upstream(_) | GatewayError::StoreRead(_) | GatewayError::StoreWrite(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_body(err: &GatewayError) -> serde_json::Value {
    serde_json::json!(ErrorResponse::new(err.to_string()))
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner summarize — `text` must be a non-blank string.
pub async fn summarize_inner(
    gateway: &SummarizationGateway,
    payload: serde_json::Value,
) -> SummarizeReply {
    let text = payload.get("text").and_then(|v| v.as_str());

    match gateway.summarize(text).await {
        Ok(result) => SummarizeReply {
            status: StatusCode::OK,
            history_saved: Some(result.persisted()),
            body: serde_json::json!(SummarizeResponse::new(result.summary)),
        },
        Err(e) => SummarizeReply {
            status: gateway_error_status(&e),
            body: error_body(&e),
            history_saved: None,
        },
    }
}

/// Inner history — the full log, newest first.
pub async fn history_inner(gateway: &SummarizationGateway) -> (StatusCode, serde_json::Value) {
    match gateway.list_history().await {
        Ok(records) => (StatusCode::OK, serde_json::json!(records)),
        Err(e) => (gateway_error_status(&e), error_body(&e)),
    }
}

/// Inner health check — validates the history file.
pub async fn health_inner(gateway: &SummarizationGateway) -> (StatusCode, serde_json::Value) {
    let history_path = gateway.history().path().display().to_string();

    match gateway.history().ensure_valid().await {
        Ok(_) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "generator": gateway.generator_name(),
                "history": history_path,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
                "history": history_path,
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "precis",
    })
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn summarize_handler(
    State(state): State<Arc<HttpState>>,
    payload: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(payload)) => summarize_inner(&state.gateway, payload).await.into_response(),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(ErrorResponse::new("Request body too large.")),
        )
            .into_response(),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Rejected summarize body");
            let err = GatewayError::Validation;
            (gateway_error_status(&err), Json(error_body(&err))).into_response()
        }
    }
}

pub async fn history_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = history_inner(&state.gateway).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.gateway).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use precis_core::{GenerateError, HistoryStore, TextGenerator};

    struct FixedGenerator(Option<&'static str>);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<Option<String>, GenerateError> {
            Ok(self.0.map(str::to_string))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn make_gateway(dir: &tempfile::TempDir, reply: Option<&'static str>) -> SummarizationGateway {
        let store = Arc::new(HistoryStore::new(dir.path().join("history.json")));
        SummarizationGateway::new(Arc::new(FixedGenerator(reply)), store)
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["service"], "precis");
    }

    #[test]
    fn test_summarize_response_shape() {
        let body = serde_json::json!(SummarizeResponse::new("A fox runs.".to_string()));
        assert_eq!(
            body,
            serde_json::json!({ "choices": [{ "message": { "content": "A fox runs." } }] })
        );
    }

    #[test]
    fn test_gateway_error_status_mapping() {
        assert_eq!(gateway_error_status(&GatewayError::Validation), StatusCode::BAD_REQUEST);
        let upstream = GatewayError::Upstream(GenerateError::MissingApiKey);
        assert_eq!(gateway_error_status(&upstream), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_body(&upstream)["message"], "Gemini API call failed.");
    }

    #[tokio::test]
    async fn test_summarize_inner_ok() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = make_gateway(&dir, Some("Short."));

        let reply = summarize_inner(&gateway, serde_json::json!({ "text": "Long text" })).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.history_saved, Some(true));
        assert_eq!(reply.body["choices"][0]["message"]["content"], "Short.");
    }

    #[tokio::test]
    async fn test_summarize_inner_rejects_non_string_text() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = make_gateway(&dir, Some("unused"));

        for payload in [
            serde_json::json!({}),
            serde_json::json!({ "text": 42 }),
            serde_json::json!({ "text": ["a"] }),
            serde_json::json!({ "text": null }),
            serde_json::json!({ "text": "  " }),
        ] {
            let reply = summarize_inner(&gateway, payload.clone()).await;
            assert_eq!(reply.status, StatusCode::BAD_REQUEST, "payload {}", payload);
            assert_eq!(reply.body["message"], "Text is required for summarization.");
            assert_eq!(reply.history_saved, None);
        }
        assert!(gateway.list_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_inner_returns_array() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = make_gateway(&dir, None);

        let (status, body) = history_inner(&gateway).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        summarize_inner(&gateway, serde_json::json!({ "text": "t" })).await;
        let (_, body) = history_inner(&gateway).await;
        assert_eq!(body[0]["summary"], "No summary found.");
    }

    #[tokio::test]
    async fn test_history_inner_read_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("history.json")).unwrap();
        let gateway = make_gateway(&dir, None);

        let (status, body) = history_inner(&gateway).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to load history.");
    }

    #[tokio::test]
    async fn test_health_inner_reports_history_path() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = make_gateway(&dir, None);

        let (status, body) = health_inner(&gateway).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["generator"], "fixed");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["history"].as_str().unwrap().ends_with("history.json"));
    }

    #[test]
    fn test_summarize_reply_sets_history_header() {
        let reply = SummarizeReply {
            status: StatusCode::OK,
            body: serde_json::json!({}),
            history_saved: Some(false),
        };
        let response = reply.into_response();
        assert_eq!(response.headers()[&HISTORY_HEADER], "failed");

        let reply = SummarizeReply {
            status: StatusCode::BAD_REQUEST,
            body: serde_json::json!({}),
            history_saved: None,
        };
        assert!(reply.into_response().headers().get(&HISTORY_HEADER).is_none());
    }

    async fn allowed_origin(layer: CorsLayer, origin: &str) -> Option<HeaderValue> {
        use tower::ServiceExt;

        let app = Router::new()
            .route("/", axum::routing::post(|| async {}))
            .layer(layer);
        let req = axum::http::Request::builder()
            .method("OPTIONS")
            .uri("/")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        resp.headers().get("access-control-allow-origin").cloned()
    }

    #[tokio::test]
    async fn test_cors_layer_wildcard_and_empty_allow_any() {
        for origins in [vec!["*".to_string()], vec![]] {
            let allowed = allowed_origin(cors_layer(&origins), "http://anywhere.test").await;
            assert_eq!(allowed.unwrap(), "*");
        }
    }

    #[tokio::test]
    async fn test_cors_layer_skips_invalid_entries() {
        let origins = vec!["http://localhost:3000".to_string(), "bad\norigin".to_string()];

        let allowed = allowed_origin(cors_layer(&origins), "http://localhost:3000").await;
        assert_eq!(allowed.unwrap(), "http://localhost:3000");

        let denied = allowed_origin(cors_layer(&origins), "http://other.test").await;
        assert!(denied.is_none());
    }
}
