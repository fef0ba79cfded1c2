use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::services::SharedLedger;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/credits", post(issue_credit))
        .route("/credits/:id", get(get_credit))
        .route("/credits/:id/transfer", post(transfer_credit))
        .route("/credits/:id/retire", post(retire_credit))
}

pub async fn issue_credit(
    Extension(ledger): Extension<SharedLedger>,
    body: Result<Json<dto::IssueCreditRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::parse_body(body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let owner = match errors::parse_owner(&body.owner) {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    match ledger.issue_credit(body.amount, &owner).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": id.to_string() })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_credit(
    Extension(ledger): Extension<SharedLedger>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let credit_id = match errors::parse_credit_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ledger.get_credit(credit_id).await {
        Ok(credit) => Json(dto::credit_to_json(&credit)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn transfer_credit(
    Extension(ledger): Extension<SharedLedger>,
    Path(id): Path<String>,
    body: Result<Json<dto::TransferCreditRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::parse_body(body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let credit_id = match errors::parse_credit_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (from_owner, to_owner) = match (
        errors::parse_owner(&body.from_owner),
        errors::parse_owner(&body.to_owner),
    ) {
        (Ok(from), Ok(to)) => (from, to),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };

    match ledger
        .transfer_credit(credit_id, &from_owner, &to_owner, body.amount)
        .await
    {
        Ok(new_id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "source_credit_id": credit_id.to_string(),
                "new_credit_id": new_id.to_string(),
            })),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn retire_credit(
    Extension(ledger): Extension<SharedLedger>,
    Path(id): Path<String>,
    body: Result<Json<dto::RetireCreditRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::parse_body(body) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let credit_id = match errors::parse_credit_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match ledger.retire_credit(credit_id, body.amount).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
