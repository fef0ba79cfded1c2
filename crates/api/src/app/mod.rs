//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and ledger construction
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::SharedLedger;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(ledger: SharedLedger) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_logging))
                .layer(Extension(ledger)),
        )
}
