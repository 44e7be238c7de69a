//! Repair order routes.
//!
//! POST   /api/v1/repair-orders      - Place a repair order (optionally with a coupon)
//! GET    /api/v1/repair-orders      - The customer's repair orders
//! GET    /api/v1/repair-orders/{id} - Retrieve one repair order
//! PUT    /api/v1/repair-orders/{id} - Edit a pending repair order
//! DELETE /api/v1/repair-orders/{id} - Cancel a pending repair order

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::models::{Actor, ApiResponse, CreateRepairOrderRequest, RepairOrder, RepairOrderDetails};

/// Build the repair orders router.
pub fn router() -> Router {
    Router::new()
        .route("/api/v1/repair-orders", get(list_orders).post(create_order))
        .route(
            "/api/v1/repair-orders/{id}",
            get(get_order).put(update_order).delete(delete_order),
        )
}

async fn create_order(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Json(req): Json<CreateRepairOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RepairOrder>>), ApiError> {
    let order = state.repair_orders.create_order(&actor, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Repair order created successfully", order)),
    ))
}

async fn list_orders(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<Vec<RepairOrder>>>, ApiError> {
    let orders = state.repair_orders.list_orders(&actor).await?;
    Ok(Json(ApiResponse::ok(
        format!("Found {} repair order(s)", orders.len()),
        orders,
    )))
}

async fn get_order(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RepairOrder>>, ApiError> {
    let order = state.repair_orders.get_order(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Repair order retrieved", order)))
}

async fn update_order(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(details): Json<RepairOrderDetails>,
) -> Result<Json<ApiResponse<RepairOrder>>, ApiError> {
    let order = state.repair_orders.update_order(&actor, id, details).await?;
    Ok(Json(ApiResponse::ok("Repair order updated successfully", order)))
}

async fn delete_order(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.repair_orders.delete_order(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Repair order deleted successfully", ())))
}
