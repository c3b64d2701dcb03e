//! Request throttling middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::app::AppState;
use crate::http::routes::AppError;

/// Reject checkout creation once the process-wide quota is spent
pub async fn limit_checkout(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.checkout_limiter.check().is_err() {
        warn!(path = %request.uri().path(), "Checkout rate limit exceeded");
        return Err(AppError::RateLimited);
    }

    Ok(next.run(request).await)
}
