//! HTTP route modules.
//!
//! - `reports`: technician report drafts, transitions and listings
//! - `repair_orders`: customer repair orders
//! - `coupons`: the coupon catalogue
//! - `payment_methods`: the payment method catalogue
//!
//! The caller's identity is resolved upstream and forwarded in the
//! `x-actor-id` and `x-actor-role` headers; [`Actor`] is extracted from them
//! directly. Workflow failures become an HTTP status plus an [`ApiResponse`]
//! envelope.

pub mod coupons;
pub mod payment_methods;
pub mod repair_orders;
pub mod reports;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{error, warn};
use uuid::Uuid;

use crate::audit::AuditDispatcher;
use crate::error::WorkflowError;
use crate::models::{Actor, ApiResponse, Role};
use crate::store::Store;
use crate::workflow::{CouponService, PaymentMethodService, RepairOrderService, ReportWorkflow};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Services shared by every handler, passed as an `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub reports: ReportWorkflow,
    pub repair_orders: RepairOrderService,
    pub coupons: CouponService,
    pub payment_methods: PaymentMethodService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, audit: AuditDispatcher) -> Self {
        Self {
            reports: ReportWorkflow::new(store.clone(), audit),
            repair_orders: RepairOrderService::new(store.clone()),
            coupons: CouponService::new(store.clone()),
            payment_methods: PaymentMethodService::new(store),
        }
    }
}

/// Build the health router.
pub fn health_router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("Service is healthy", "ok"))
}

// ============================================================================
// Errors
// ============================================================================

/// Failure returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    /// Identity headers missing or malformed.
    Unauthenticated(String),
    Workflow(WorkflowError),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Authorization(_) => StatusCode::FORBIDDEN,
        WorkflowError::StateTransition { .. } | WorkflowError::OrderState { .. } => StatusCode::CONFLICT,
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::ConcurrencyConflict { .. } => StatusCode::CONFLICT,
        WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated(message) => (StatusCode::UNAUTHORIZED, message),
            ApiError::Workflow(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!("Request failed: {}", err);
                } else {
                    warn!("Request rejected ({}): {}", status, err);
                }
                (status, err.to_string())
            }
        };
        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

// ============================================================================
// Identity
// ============================================================================

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| ApiError::Unauthenticated(format!("Missing {} header", name)))
        };

        let id: Uuid = header(ACTOR_ID_HEADER)?
            .trim()
            .parse()
            .map_err(|_| ApiError::Unauthenticated(format!("Malformed {} header", ACTOR_ID_HEADER)))?;
        let role: Role = header(ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(|_| ApiError::Unauthenticated(format!("Malformed {} header", ACTOR_ROLE_HEADER)))?;

        Ok(Actor { id, role })
    }
}
