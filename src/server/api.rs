//! REST API handlers for the publish server
//!
//! The publish submission returns a job id immediately; clients poll the
//! job endpoint until it reaches a terminal state.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::{MediaItem, Platform};
use crate::publisher::PublishRequest;

use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Publish submission body
#[derive(Debug, Deserialize)]
pub struct PublishBody {
    /// Requesting user (auth is a collaborator's concern)
    pub user_id: String,

    /// Stored post to bind results to
    #[serde(default)]
    pub post_id: Option<String>,

    #[serde(default)]
    pub caption: Option<String>,

    #[serde(default)]
    pub hashtags: Vec<String>,

    /// Legacy single-image field
    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub media: Vec<MediaItem>,

    pub platforms: Vec<String>,
}

impl From<PublishBody> for PublishRequest {
    fn from(body: PublishBody) -> Self {
        Self {
            user_id: body.user_id,
            post_id: body.post_id,
            caption: body.caption,
            hashtags: body.hashtags,
            image: body.image,
            media: body.media,
            platforms: body.platforms,
        }
    }
}

/// Publish submission acknowledgement
#[derive(Debug, Serialize)]
pub struct PublishAccepted {
    pub job_id: String,
    pub status: &'static str,
}

/// Supported platforms response
#[derive(Debug, Serialize)]
pub struct PlatformsResponse {
    pub platforms: Vec<&'static str>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/api/health", get(health_check))
        // Publish endpoints
        .route("/api/publish", post(submit_publish))
        .route("/api/jobs/{id}", get(get_job))
        // Discovery endpoints
        .route("/api/platforms", get(list_platforms))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    }))
}

/// Submit a publish request; returns the job id immediately
async fn submit_publish(
    State(state): State<AppState>,
    Json(body): Json<PublishBody>,
) -> axum::response::Response {
    match state.publisher.submit(body.into()).await {
        Ok(job_id) => (
            StatusCode::OK,
            Json(ApiResponse::success(PublishAccepted {
                job_id,
                status: "processing",
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

/// Poll a job by id
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.jobs.get(&id).await {
        Some(job) => (StatusCode::OK, Json(ApiResponse::success(job))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Job not found: {}", id))),
        )
            .into_response(),
    }
}

/// List supported platform identifiers
async fn list_platforms() -> impl IntoResponse {
    Json(ApiResponse::success(PlatformsResponse {
        platforms: Platform::all().iter().map(|p| p.id()).collect(),
    }))
}
