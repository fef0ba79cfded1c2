use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use carbonledger_core::{CreditId, OwnerId};
use carbonledger_infra::{LedgerError, TradeSide};

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        LedgerError::InvalidAmount(_) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_amount", message)
        }
        LedgerError::InvalidOwner(_) => json_error(StatusCode::BAD_REQUEST, "invalid_owner", message),
        LedgerError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", message),
        LedgerError::NotOwner { .. } => json_error(StatusCode::FORBIDDEN, "not_owner", message),
        LedgerError::InsufficientBalance { .. } => {
            json_error(StatusCode::CONFLICT, "insufficient_balance", message)
        }
        LedgerError::CreditInactive(_) => json_error(StatusCode::CONFLICT, "credit_inactive", message),
        LedgerError::NoActiveCredits(_) => {
            json_error(StatusCode::CONFLICT, "no_active_credits", message)
        }
        LedgerError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_credit_id(raw: &str) -> Result<CreditId, axum::response::Response> {
    raw.parse()
        .map_err(|e: carbonledger_core::DomainError| {
            json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string())
        })
}

pub fn parse_owner(raw: &str) -> Result<OwnerId, axum::response::Response> {
    OwnerId::new(raw).map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_owner", e.to_string()))
}

pub fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(value)| value)
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_request", e.body_text()))
}

pub fn parse_trade_side(raw: &str) -> Result<TradeSide, axum::response::Response> {
    raw.parse()
        .map_err(|e: carbonledger_core::DomainError| {
            json_error(StatusCode::BAD_REQUEST, "invalid_side", e.to_string())
        })
}
