use axum::{
    extract::{Extension, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::SharedLedger;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/transactions", get(get_history))
}

pub async fn get_history(
    Extension(ledger): Extension<SharedLedger>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    let owner = match query.owner.as_deref().map(errors::parse_owner).transpose() {
        Ok(owner) => owner,
        Err(resp) => return resp,
    };

    match ledger.get_transaction_history(owner.as_ref()).await {
        Ok(records) => Json(
            records
                .iter()
                .map(dto::transaction_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
