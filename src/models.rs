//! Domain models for the repair workflow.
//!
//! These structs map to the `repair_orders`, `coupons`, `payment_methods` and
//! `technician_reports` tables. Every persisted entity carries a `version` column used for
//! optimistic concurrency: a write names the version it read and the store
//! rejects it if the row has moved on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;
use crate::workflow::report_state::ReportStatus;

// ============================================================================
// Actor identity
// ============================================================================

/// Role of the caller, resolved upstream by the auth gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Technician,
    Admin,
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "TECHNICIAN" => Ok(Role::Technician),
            "ADMIN" => Ok(Role::Admin),
            other => Err(WorkflowError::validation(format!("unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Customer => "Customer",
            Role::Technician => "Technician",
            Role::Admin => "Admin",
        })
    }
}

/// The caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn customer(id: Uuid) -> Self {
        Self { id, role: Role::Customer }
    }

    pub fn technician(id: Uuid) -> Self {
        Self { id, role: Role::Technician }
    }

    pub fn admin(id: Uuid) -> Self {
        Self { id, role: Role::Admin }
    }
}

// ============================================================================
// Database Models (sqlx::FromRow)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairOrderStatus {
    PendingConfirmation,
    InProgress,
    Completed,
}

impl RepairOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairOrderStatus::PendingConfirmation => "PENDING_CONFIRMATION",
            RepairOrderStatus::InProgress => "IN_PROGRESS",
            RepairOrderStatus::Completed => "COMPLETED",
        }
    }

    fn rank(self) -> u8 {
        match self {
            RepairOrderStatus::PendingConfirmation => 0,
            RepairOrderStatus::InProgress => 1,
            RepairOrderStatus::Completed => 2,
        }
    }

    /// Order status never regresses.
    pub fn can_advance_to(self, next: RepairOrderStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for RepairOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer's repair request. The technician is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RepairOrder {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub technician_id: Uuid,
    pub status: RepairOrderStatus,
    pub item_name: String,
    pub item_condition: String,
    pub issue_description: String,
    pub desired_service_date: NaiveDate,
    pub payment_method_id: Uuid,
    pub coupon_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepairOrder {
    /// Advances the coarse lifecycle status, refusing regressions.
    pub fn advance(&mut self, next: RepairOrderStatus) -> Result<(), WorkflowError> {
        if !self.status.can_advance_to(next) {
            let action = match next {
                RepairOrderStatus::PendingConfirmation => "reopen",
                RepairOrderStatus::InProgress => "start",
                RepairOrderStatus::Completed => "complete",
            };
            return Err(WorkflowError::OrderState {
                action,
                order_id: self.id,
                status: self.status,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A discount code with a bounded, shared usage counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_amount: i64,
    pub max_usage: i32,
    pub usage_count: i32,
    pub valid_until: Option<NaiveDate>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.valid_until.is_some_and(|until| until < today)
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.max_usage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethodType {
    BankTransfer,
    EWallet,
}

/// An account customers can pay a repair order into. Managed by admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub name: String,
    pub method_type: PaymentMethodType,
    pub provider: String,
    pub account_number: String,
    pub account_name: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A technician's diagnostic report for one repair order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TechnicianReport {
    pub report_id: Uuid,
    pub repair_order_id: Uuid,
    pub technician_id: Uuid,
    pub diagnosis: Option<String>,
    pub action_plan: Option<String>,
    pub estimated_cost: Option<i64>,
    pub estimated_time_seconds: Option<i64>,
    pub status: ReportStatus,
    pub version: i64,
    pub last_updated_at: DateTime<Utc>,
}

impl TechnicianReport {
    /// An empty draft owned by `technician_id`.
    pub fn draft(repair_order_id: Uuid, technician_id: Uuid) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            repair_order_id,
            technician_id,
            diagnosis: None,
            action_plan: None,
            estimated_cost: None,
            estimated_time_seconds: None,
            status: ReportStatus::Draft,
            version: 0,
            last_updated_at: Utc::now(),
        }
    }
}

// ============================================================================
// Request Models (Deserialize from JSON input)
// ============================================================================

/// Editable report fields. Drafts may be saved incomplete; completeness is
/// enforced on submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportDraftFields {
    pub diagnosis: Option<String>,
    pub action_plan: Option<String>,
    pub estimated_cost: Option<i64>,
    pub estimated_time_seconds: Option<i64>,
}

/// Request body for creating a report draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReportDraftRequest {
    pub repair_order_id: Uuid,
    #[serde(flatten)]
    pub fields: ReportDraftFields,
}

/// Query string for status-filtered report listings.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

/// Request body for creating a repair order. The technician has already been
/// chosen by the booking flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRepairOrderRequest {
    pub technician_id: Uuid,
    #[serde(flatten)]
    pub details: RepairOrderDetails,
}

/// Customer-editable repair order fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairOrderDetails {
    pub item_name: String,
    pub item_condition: String,
    pub issue_description: String,
    pub desired_service_date: NaiveDate,
    pub payment_method_id: Uuid,
    pub coupon_code: Option<String>,
}

/// Request body for creating or updating a coupon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponRequest {
    pub code: String,
    pub discount_amount: i64,
    pub max_usage: i32,
    pub valid_until: Option<NaiveDate>,
}

/// Request body for creating or updating a payment method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodRequest {
    pub name: String,
    pub method_type: PaymentMethodType,
    pub provider: String,
    pub account_number: String,
    pub account_name: String,
}

// ============================================================================
// Response Models
// ============================================================================

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }
}

/// A report as shown to a caller. For customers `estimated_cost` is net of the
/// order's coupon discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportView {
    pub report_id: Uuid,
    pub repair_order_id: Uuid,
    pub technician_id: Uuid,
    pub diagnosis: Option<String>,
    pub action_plan: Option<String>,
    pub estimated_cost: Option<i64>,
    pub estimated_time_seconds: Option<i64>,
    pub status: ReportStatus,
    pub last_updated_at: DateTime<Utc>,
}

impl ReportView {
    /// Subtracts `discount` from the estimate, never going below zero.
    pub fn with_discount(mut self, discount: i64) -> Self {
        self.estimated_cost = self.estimated_cost.map(|cost| (cost - discount).max(0));
        self
    }
}

impl From<&TechnicianReport> for ReportView {
    fn from(report: &TechnicianReport) -> Self {
        Self {
            report_id: report.report_id,
            repair_order_id: report.repair_order_id,
            technician_id: report.technician_id,
            diagnosis: report.diagnosis.clone(),
            action_plan: report.action_plan.clone(),
            estimated_cost: report.estimated_cost,
            estimated_time_seconds: report.estimated_time_seconds,
            status: report.status,
            last_updated_at: report.last_updated_at,
        }
    }
}
