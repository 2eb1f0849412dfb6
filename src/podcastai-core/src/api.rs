//! HTTP entry points: orchestration and plan generation.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt;
use serde_json::{Value, json};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::PodcastError;
use crate::generate::{GenerationRequest, PlanGenerator};
use crate::pipeline::Pipeline;
use crate::validate::messages;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    generator: Option<Arc<PlanGenerator>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<PlanGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orchestrate", post(orchestrate))
        .route("/generate-pap", post(generate_pap))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn orchestrate(State(state): State<AppState>, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body", Some(e.to_string()));
        }
    };

    let run = AssertUnwindSafe(state.pipeline.orchestrate(raw))
        .catch_unwind()
        .await;

    match run {
        Ok(Ok(run)) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Podcast Assembly Plan received and processed",
                "summary": run.summary,
                "processed_segments": run.results,
            })),
        )
            .into_response(),
        Ok(Err(errors)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "Invalid Podcast Assembly Plan format",
                "messages": messages(&errors),
                "details": errors,
            })),
        )
            .into_response(),
        Err(panic) => {
            let details = panic
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::error!(%details, "orchestration aborted");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process Podcast Assembly Plan",
                Some(details),
            )
        }
    }
}

async fn generate_pap(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(generator) = state.generator.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Plan generation is not configured",
            None,
        );
    };

    let request: GenerationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body", Some(e.to_string()));
        }
    };

    if request.prompt.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Prompt is required", None);
    }

    match generator.generate(&request).await {
        Ok(plan) => (StatusCode::OK, Json(plan)).into_response(),
        Err(PodcastError::NoPlanInReply) => error_response(
            StatusCode::BAD_GATEWAY,
            "Failed to generate podcast plan",
            Some(PodcastError::NoPlanInReply.to_string()),
        ),
        Err(PodcastError::InvalidApiKey(_)) => {
            error_response(StatusCode::UNAUTHORIZED, "Invalid OpenAI API key", None)
        }
        Err(PodcastError::RateLimited(_)) => {
            error_response(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded", None)
        }
        Err(e) => {
            tracing::error!(error = %e, "plan generation failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate podcast plan",
                Some(e.to_string()),
            )
        }
    }
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    let body = match details {
        Some(details) => json!({"error": error, "details": details}),
        None => json!({"error": error}),
    };
    (status, Json(body)).into_response()
}
