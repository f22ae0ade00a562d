//! HTTP endpoints
//!
//! One POST endpoint runs the pipeline; health and readiness round it out.
//! Error mapping: validation failures are 400, uninitialized vector
//! collections are 503 with the explanatory message, everything else is
//! a 500 with no internal detail leaked.

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use maktaba_config::constants::deadlines;
use maktaba_core::{Error, SearchParams};

use crate::state::AppState;

/// Structured error body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Create the application router
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/api/search", post(search))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(deadlines::REQUEST))
        .layer(build_cors_layer(cors_origins))
        .with_state(state)
}

/// Build the CORS layer from configured origins; none configured means
/// permissive (development)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "Invalid CORS origin");
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Search endpoint
async fn search(
    State(state): State<AppState>,
    Json(params): Json<SearchParams>,
) -> impl IntoResponse {
    match state.pipeline.search(params).await {
        Ok(response) => (StatusCode::OK, Json(serde_json::json!(response))),
        Err(error) => {
            let status =
                StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = match &error {
                Error::Validation(message) => ErrorBody {
                    error: "Invalid parameters".to_string(),
                    message: Some(message.clone()),
                },
                Error::CollectionNotFound => ErrorBody {
                    error: "Collection not found".to_string(),
                    message: None,
                },
                Error::Internal(message) => {
                    tracing::error!(error = %message, "Search request failed");
                    ErrorBody {
                        error: "Internal server error".to_string(),
                        message: None,
                    }
                }
            };
            (status, Json(serde_json::json!(body)))
        }
    }
}

/// Liveness
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness
async fn readiness_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ready",
        "environment": format!("{:?}", state.environment).to_lowercase(),
    }))
}
