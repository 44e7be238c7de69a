//! Technician report routes.
//!
//! GET    /api/v1/technician-reports?status=           - Caller's reports by status
//! GET    /api/v1/technician-reports/for-customer?status= - Customer view, net of coupon
//! GET    /api/v1/technician-reports/incoming-repair-orders - Orders awaiting a report
//! POST   /api/v1/technician-reports                   - Create a draft
//! GET    /api/v1/technician-reports/{id}              - Read one report
//! PUT    /api/v1/technician-reports/{id}              - Update a draft
//! DELETE /api/v1/technician-reports/{id}              - Delete a draft
//! POST   /api/v1/technician-reports/{id}/submit       - DRAFT -> SUBMITTED
//! POST   /api/v1/technician-reports/{id}/accept       - SUBMITTED -> APPROVED
//! POST   /api/v1/technician-reports/{id}/reject       - SUBMITTED -> REJECTED
//! POST   /api/v1/technician-reports/{id}/start        - APPROVED -> IN_PROGRESS
//! POST   /api/v1/technician-reports/{id}/complete     - IN_PROGRESS -> COMPLETED

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::error::WorkflowError;
use crate::models::{
    Actor, ApiResponse, CreateReportDraftRequest, RepairOrder, ReportDraftFields, ReportView, Role, StatusQuery,
    TechnicianReport,
};
use crate::workflow::report_state::ReportStatus;

type ReportResult = Result<Json<ApiResponse<TechnicianReport>>, ApiError>;

/// Build the technician reports router.
pub fn router() -> Router {
    Router::new()
        .route("/api/v1/technician-reports", get(list_reports).post(create_draft))
        .route("/api/v1/technician-reports/for-customer", get(list_for_customer))
        .route(
            "/api/v1/technician-reports/incoming-repair-orders",
            get(incoming_orders),
        )
        .route(
            "/api/v1/technician-reports/{id}",
            get(get_report).put(update_draft).delete(delete_draft),
        )
        .route("/api/v1/technician-reports/{id}/submit", post(submit_draft))
        .route("/api/v1/technician-reports/{id}/accept", post(accept_submission))
        .route("/api/v1/technician-reports/{id}/reject", post(reject_submission))
        .route("/api/v1/technician-reports/{id}/start", post(start_work))
        .route("/api/v1/technician-reports/{id}/complete", post(complete_work))
}

async fn list_reports(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<Vec<ReportView>>>, ApiError> {
    let status: ReportStatus = query.status.parse()?;
    let reports = state.reports.list_by_status(&actor, status).await?;
    Ok(Json(ApiResponse::ok(
        format!("Found {} report(s)", reports.len()),
        reports,
    )))
}

async fn list_for_customer(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<Vec<ReportView>>>, ApiError> {
    if actor.role != Role::Customer {
        return Err(WorkflowError::unauthorized("Only customers can use this listing").into());
    }
    let status: ReportStatus = query.status.parse()?;
    let reports = state.reports.list_by_status(&actor, status).await?;
    Ok(Json(ApiResponse::ok(
        format!("Found {} report(s)", reports.len()),
        reports,
    )))
}

async fn incoming_orders(
    Extension(state): Extension<AppState>,
    actor: Actor,
) -> Result<Json<ApiResponse<Vec<RepairOrder>>>, ApiError> {
    let orders = state.reports.incoming_orders(&actor).await?;
    Ok(Json(ApiResponse::ok(
        format!("Found {} incoming repair order(s)", orders.len()),
        orders,
    )))
}

async fn create_draft(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Json(req): Json<CreateReportDraftRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TechnicianReport>>), ApiError> {
    let report = state.reports.create_draft(&actor, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Report draft created successfully", report)),
    ))
}

async fn get_report(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReportView>>, ApiError> {
    let report = state.reports.get_report(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Report retrieved", report)))
}

async fn update_draft(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(fields): Json<ReportDraftFields>,
) -> ReportResult {
    let report = state.reports.update_draft(&actor, id, fields).await?;
    Ok(Json(ApiResponse::ok("Report draft updated successfully", report)))
}

async fn delete_draft(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.reports.delete_draft(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Report draft deleted successfully", ())))
}

async fn submit_draft(Extension(state): Extension<AppState>, actor: Actor, Path(id): Path<Uuid>) -> ReportResult {
    let report = state.reports.submit_draft(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Report submitted successfully", report)))
}

async fn accept_submission(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ReportResult {
    let report = state.reports.accept_submission(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Report accepted successfully", report)))
}

async fn reject_submission(
    Extension(state): Extension<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ReportResult {
    let report = state.reports.reject_submission(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Report rejected successfully", report)))
}

async fn start_work(Extension(state): Extension<AppState>, actor: Actor, Path(id): Path<Uuid>) -> ReportResult {
    let report = state.reports.start_work(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Work started successfully", report)))
}

async fn complete_work(Extension(state): Extension<AppState>, actor: Actor, Path(id): Path<Uuid>) -> ReportResult {
    let report = state.reports.complete_work(&actor, id).await?;
    Ok(Json(ApiResponse::ok("Work completed successfully", report)))
}
