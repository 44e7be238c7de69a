//! # Repair Workflow Service Library
//!
//! Technician report workflow for repair orders: a report state machine, a
//! shared coupon usage counter under optimistic concurrency, and the
//! orchestration tying reports, orders and coupons together.
//!
//! Exposes the Axum router and modules so integration tests can create
//! an in-process server without requiring `cargo run` in another terminal.

pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod store;
pub mod workflow;

use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::{WorkflowError, WorkflowResult};
pub use routes::AppState;

/// Build the Axum router with all route modules and middleware.
///
/// The caller wires the store and audit dispatcher into `state`. This
/// function does NOT start a server or the background tasks.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_router())
        .merge(routes::reports::router())
        .merge(routes::repair_orders::router())
        .merge(routes::coupons::router())
        .merge(routes::payment_methods::router())
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
