use axum::Router;

pub mod admin;
pub mod credits;
pub mod owners;
pub mod system;
pub mod transactions;

/// Router for every ledger endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .merge(credits::router())
        .merge(owners::router())
        .merge(transactions::router())
        .nest("/admin", admin::router())
}
