//! Coupon catalogue routes.
//!
//! GET    /api/v1/coupons      - List coupons (any authenticated caller)
//! POST   /api/v1/coupons      - Create a coupon (admin)
//! GET    /api/v1/coupons/{id} - Retrieve a coupon (admin)
//! PUT    /api/v1/coupons/{id} - Update a coupon (admin)
//! DELETE /api/v1/coupons/{id} - Delete an unused coupon (admin)

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::models::{Actor, ApiResponse, Coupon, CouponRequest};

/// Build the coupons router.
pub fn router() -> Router {
    Router::new()
        .route("/api/v1/coupons", get(list_coupons).post(create_coupon))
        .route(
            "/api/v1/coupons/{id}",
            get(get_coupon).put(update_coupon).delete(delete_coupon),
        )
}

async fn list_coupons(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<Vec<Coupon>>>, ApiError> {
    let coupons = state.coupons.list_coupons(&actor).await?;
    Ok(Json(ApiResponse::ok(
        format!("Found {} coupon(s)", coupons.len()),
        coupons,
    )))
}

async fn create_coupon(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Json(req): Json<CouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Coupon>>), ApiError> {
    let coupon = state.coupons.create_coupon(&actor, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Coupon created successfully", coupon)),
    ))
}

async fn get_coupon(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Coupon>>, ApiError> {
    let coupon = state.coupons.get_coupon(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Coupon retrieved", coupon)))
}

async fn update_coupon(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<CouponRequest>,
) -> Result<Json<ApiResponse<Coupon>>, ApiError> {
    let coupon = state.coupons.update_coupon(&actor, id, req).await?;
    Ok(Json(ApiResponse::ok("Coupon updated successfully", coupon)))
}

async fn delete_coupon(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.coupons.delete_coupon(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Coupon deleted successfully", ())))
}
