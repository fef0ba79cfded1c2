use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::services::SharedLedger;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/expire", post(expire_credits))
}

/// On-demand expiry sweep; the background worker runs the same operation.
pub async fn expire_credits(Extension(ledger): Extension<SharedLedger>) -> axum::response::Response {
    match ledger.expire_credits().await {
        Ok(report) => Json(dto::expiry_report_to_json(&report)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
