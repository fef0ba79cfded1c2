use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use carbonledger_infra::TradeSide;

use crate::app::services::SharedLedger;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/owners/:owner/balance", get(get_balance))
        .route("/owners/:owner/credits", get(list_credits))
        .route("/owners/:owner/trade", post(execute_trade))
}

pub async fn get_balance(
    Extension(ledger): Extension<SharedLedger>,
    Path(owner): Path<String>,
) -> axum::response::Response {
    let owner = match errors::parse_owner(&owner) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    match ledger.get_credit_balance(&owner).await {
        Ok(balance) => Json(serde_json::json!({
            "owner": owner.as_str(),
            "balance": balance,
        }))
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_credits(
    Extension(ledger): Extension<SharedLedger>,
    Path(owner): Path<String>,
    Query(query): Query<dto::ListCreditsQuery>,
) -> axum::response::Response {
    let owner = match errors::parse_owner(&owner) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    match ledger.list_credits(&owner, query.active_only.unwrap_or(true)).await {
        Ok(credits) => Json(
            credits
                .iter()
                .map(dto::credit_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn execute_trade(
    Extension(ledger): Extension<SharedLedger>,
    Path(owner): Path<String>,
    body: Result<Json<dto::TradeRequest>, JsonRejection>,
) -> axum::response::Response {
    let owner = match errors::parse_owner(&owner) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };
    let body = match errors::parse_body(body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let side = match errors::parse_trade_side(&body.side) {
        Ok(side) => side,
        Err(resp) => return resp,
    };

    match ledger.execute_trade(&owner, side, body.amount).await {
        Ok(credit_id) => {
            // A buy mints a new credit; a sell draws from an existing one.
            let (status, label) = match side {
                TradeSide::Buy => (StatusCode::CREATED, "buy"),
                TradeSide::Sell => (StatusCode::OK, "sell"),
            };
            (
                status,
                Json(serde_json::json!({
                    "side": label,
                    "amount": body.amount,
                    "credit_id": credit_id.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}
