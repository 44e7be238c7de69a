//! Payment method routes.
//!
//! GET    /api/v1/payment-methods      - List payment methods (any authenticated caller)
//! POST   /api/v1/payment-methods      - Create a payment method (admin)
//! GET    /api/v1/payment-methods/{id} - Retrieve a payment method
//! PUT    /api/v1/payment-methods/{id} - Update a payment method (admin)
//! DELETE /api/v1/payment-methods/{id} - Delete an unused payment method (admin)

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::models::{Actor, ApiResponse, PaymentMethod, PaymentMethodRequest};

/// Build the payment methods router.
pub fn router() -> Router {
    Router::new()
        .route(
            "/api/v1/payment-methods",
            get(list_payment_methods).post(create_payment_method),
        )
        .route(
            "/api/v1/payment-methods/{id}",
            get(get_payment_method)
                .put(update_payment_method)
                .delete(delete_payment_method),
        )
}

async fn list_payment_methods(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<Vec<PaymentMethod>>>, ApiError> {
    let methods = state.payment_methods.list_payment_methods(&actor).await?;
    Ok(Json(ApiResponse::ok(
        format!("Found {} payment method(s)", methods.len()),
        methods,
    )))
}

async fn create_payment_method(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Json(req): Json<PaymentMethodRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentMethod>>), ApiError> {
    let method = state.payment_methods.create_payment_method(&actor, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Payment method created successfully", method)),
    ))
}

async fn get_payment_method(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentMethod>>, ApiError> {
    let method = state.payment_methods.get_payment_method(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Payment method retrieved", method)))
}

async fn update_payment_method(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentMethodRequest>,
) -> Result<Json<ApiResponse<PaymentMethod>>, ApiError> {
    let method = state.payment_methods.update_payment_method(&actor, id, req).await?;
    Ok(Json(ApiResponse::ok("Payment method updated successfully", method)))
}

async fn delete_payment_method(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.payment_methods.delete_payment_method(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Payment method deleted successfully", ())))
}
