use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::errors;
use crate::app::services::SharedLedger;

/// Liveness plus a reachability check of the credit store.
pub async fn health(Extension(ledger): Extension<SharedLedger>) -> axum::response::Response {
    match ledger.health_check().await {
        Ok(()) => Json(serde_json::json!({ "status": "ok" })).into_response(),
        Err(e) => errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "unhealthy", e.to_string()),
    }
}
