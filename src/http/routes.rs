//! HTTP route definitions

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use axum_extra::{headers::ContentType, TypedHeader};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::app::AppState;
use crate::http::middleware::limit_checkout;
use crate::payments::stripe::{SIGNAL_CURRENCY, SIGNAL_PRICE_CENTS};
use crate::payments::webhook::stripe_webhook_handler;
use crate::store::{Project, StoreError};
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/api/config", get(config_handler))
        .route("/api/projects", get(list_projects_handler))
        .route("/api/projects/:id", get(project_handler))
        .route("/api/webhook", post(stripe_webhook_handler));

    // Checkout creation is throttled
    let checkout_routes = Router::new()
        .route("/api/checkout", post(checkout_handler))
        .layer(middleware::from_fn_with_state(state.clone(), limit_checkout));

    Router::new()
        .merge(public_routes)
        .merge(checkout_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    content_store_configured: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        content_store_configured: state.config.notion_configured(),
    })
}

// ============================================================================
// Client configuration
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientConfigResponse {
    publishable_key: String,
    price_cents: u32,
    currency: &'static str,
}

async fn config_handler(State(state): State<AppState>) -> Json<ClientConfigResponse> {
    Json(ClientConfigResponse {
        publishable_key: state.config.stripe_publishable_key.clone(),
        price_cents: SIGNAL_PRICE_CENTS,
        currency: SIGNAL_CURRENCY,
    })
}

// ============================================================================
// Project endpoints
// ============================================================================

/// The board lists whatever the store returns; a store outage yields an empty list
async fn list_projects_handler(State(state): State<AppState>) -> Json<Vec<Project>> {
    match state.store.query_projects().await {
        Ok(projects) => Json(projects),
        Err(e) => {
            error!(error = %e, "Failed to fetch projects");
            Json(Vec::new())
        }
    }
}

async fn project_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, AppError> {
    state.store.get_project(&id).await.map(Json).map_err(|e| match e {
        StoreError::NotFound(missing) | StoreError::InvalidId(missing) => {
            AppError::NotFound(format!("Project {} not found", missing))
        }
        StoreError::NotConfigured => {
            AppError::Unavailable("Content store is not configured".to_string())
        }
        other => {
            error!(project_id = %id, error = %other, "Failed to fetch project");
            AppError::Upstream("Failed to fetch project".to_string())
        }
    })
}

// ============================================================================
// Payment endpoints
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    project_id: Option<String>,
    project_name: Option<String>,
}

#[derive(Serialize)]
struct CheckoutResponse {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

async fn checkout_handler(
    State(state): State<AppState>,
    content_type: Option<TypedHeader<ContentType>>,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, AppError> {
    let is_json = content_type
        .map(|TypedHeader(ct)| ct.to_string())
        .is_some_and(|ct| ct.split(';').next().map(str::trim) == Some("application/json"));
    if !is_json {
        return Err(AppError::BadRequest(
            "Invalid request: Content-Type must be application/json".to_string(),
        ));
    }

    let req: CheckoutRequest = serde_json::from_slice(&body).map_err(|_| {
        AppError::BadRequest("Invalid request: body must be valid JSON".to_string())
    })?;

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let project_id = non_empty(req.project_id);
    let project_name = non_empty(req.project_name);
    let (Some(project_id), Some(project_name)) = (project_id, project_name) else {
        return Err(AppError::BadRequest(
            "Missing required project information (projectId, projectName)".to_string(),
        ));
    };

    let session = state
        .stripe
        .create_checkout_session(&project_id, &project_name)
        .await
        .map_err(|e| {
            error!(project_id = %project_id, error = %e, "Checkout session creation failed");
            AppError::Internal(format!("Stripe error: {}", e))
        })?;

    Ok(Json(CheckoutResponse {
        id: session.id,
        url: session.url,
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again shortly".to_string(),
            ),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": { "message": message }
        });

        (status, Json(body)).into_response()
    }
}
