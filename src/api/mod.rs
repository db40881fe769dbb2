pub mod error;
pub mod events;
pub mod stream;

use gotcha::Json;
use gotcha::axum::response::{IntoResponse, Response};
use serde_json::json;

/// GET /health
pub async fn health_check() -> Response {
    Json(json!({"status": "ok"})).into_response()
}
