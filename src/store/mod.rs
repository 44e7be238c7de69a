//! Persistence seam for the repair workflow.
//!
//! Reads go straight through the [`Store`] trait. Writes are staged into a
//! [`ChangeSet`] and committed together: either every write lands or none
//! does. Each update or delete carries the version it read, and a mismatch
//! fails the whole commit with [`StoreError::Conflict`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::events::OutboxMessage;
use crate::models::{Coupon, PaymentMethod, RepairOrder, TechnicianReport};
use crate::workflow::report_state::ReportStatus;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Repair orders ====================

    async fn find_repair_order(&self, id: Uuid) -> StoreResult<Option<RepairOrder>>;

    async fn list_repair_orders_by_customer(&self, customer_id: Uuid) -> StoreResult<Vec<RepairOrder>>;

    async fn list_repair_orders_by_technician(&self, technician_id: Uuid) -> StoreResult<Vec<RepairOrder>>;

    // ==================== Coupons ====================

    async fn find_coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>>;

    async fn find_coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>>;

    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>>;

    // ==================== Payment methods ====================

    async fn find_payment_method(&self, id: Uuid) -> StoreResult<Option<PaymentMethod>>;

    async fn list_payment_methods(&self) -> StoreResult<Vec<PaymentMethod>>;

    /// Whether any repair order still pays with this method.
    async fn payment_method_in_use(&self, id: Uuid) -> StoreResult<bool>;

    // ==================== Technician reports ====================

    async fn find_report(&self, report_id: Uuid) -> StoreResult<Option<TechnicianReport>>;

    async fn list_reports_by_technician_and_status(
        &self,
        technician_id: Uuid,
        status: ReportStatus,
    ) -> StoreResult<Vec<TechnicianReport>>;

    async fn list_reports_by_status(&self, status: ReportStatus) -> StoreResult<Vec<TechnicianReport>>;

    /// Reports in `status` whose repair order belongs to `customer_id`.
    async fn list_reports_by_customer_and_status(
        &self,
        customer_id: Uuid,
        status: ReportStatus,
    ) -> StoreResult<Vec<TechnicianReport>>;

    /// Whether the order already has a report that is not REJECTED.
    async fn has_active_report(&self, repair_order_id: Uuid) -> StoreResult<bool>;

    // ==================== Writes ====================

    /// Applies every staged write atomically.
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;

    // ==================== Outbox ====================

    /// Oldest unpublished outbox messages first.
    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>>;

    async fn mark_outbox_published(&self, id: Uuid) -> StoreResult<()>;
}

// ============================================================================
// Change sets
// ============================================================================

/// One staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertRepairOrder(RepairOrder),
    UpdateRepairOrder { row: RepairOrder, expected_version: i64 },
    DeleteRepairOrder { id: Uuid, expected_version: i64 },
    InsertCoupon(Coupon),
    UpdateCoupon { row: Coupon, expected_version: i64 },
    DeleteCoupon { id: Uuid, expected_version: i64 },
    InsertPaymentMethod(PaymentMethod),
    UpdatePaymentMethod { row: PaymentMethod, expected_version: i64 },
    DeletePaymentMethod { id: Uuid, expected_version: i64 },
    InsertReport(TechnicianReport),
    UpdateReport { row: TechnicianReport, expected_version: i64 },
    DeleteReport { id: Uuid, expected_version: i64 },
    EnqueueOutbox(OutboxMessage),
}

/// Writes belonging to one logical operation.
///
/// The `update_*` methods advance the passed entity's `version` to the value
/// it will hold once the commit succeeds, so callers can hand the entity back
/// without re-reading it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn insert_repair_order(&mut self, order: &RepairOrder) {
        self.changes.push(Change::InsertRepairOrder(order.clone()));
    }

    pub fn update_repair_order(&mut self, order: &mut RepairOrder) {
        let expected_version = order.version;
        order.version += 1;
        order.updated_at = Utc::now();
        self.changes.push(Change::UpdateRepairOrder {
            row: order.clone(),
            expected_version,
        });
    }

    pub fn delete_repair_order(&mut self, order: &RepairOrder) {
        self.changes.push(Change::DeleteRepairOrder {
            id: order.id,
            expected_version: order.version,
        });
    }

    pub fn insert_coupon(&mut self, coupon: &Coupon) {
        self.changes.push(Change::InsertCoupon(coupon.clone()));
    }

    pub fn update_coupon(&mut self, coupon: &mut Coupon) {
        let expected_version = coupon.version;
        coupon.version += 1;
        coupon.updated_at = Utc::now();
        self.changes.push(Change::UpdateCoupon {
            row: coupon.clone(),
            expected_version,
        });
    }

    pub fn delete_coupon(&mut self, coupon: &Coupon) {
        self.changes.push(Change::DeleteCoupon {
            id: coupon.id,
            expected_version: coupon.version,
        });
    }

    pub fn insert_payment_method(&mut self, method: &PaymentMethod) {
        self.changes.push(Change::InsertPaymentMethod(method.clone()));
    }

    pub fn update_payment_method(&mut self, method: &mut PaymentMethod) {
        let expected_version = method.version;
        method.version += 1;
        method.updated_at = Utc::now();
        self.changes.push(Change::UpdatePaymentMethod {
            row: method.clone(),
            expected_version,
        });
    }

    pub fn delete_payment_method(&mut self, method: &PaymentMethod) {
        self.changes.push(Change::DeletePaymentMethod {
            id: method.id,
            expected_version: method.version,
        });
    }

    pub fn insert_report(&mut self, report: &TechnicianReport) {
        self.changes.push(Change::InsertReport(report.clone()));
    }

    pub fn update_report(&mut self, report: &mut TechnicianReport) {
        let expected_version = report.version;
        report.version += 1;
        self.changes.push(Change::UpdateReport {
            row: report.clone(),
            expected_version,
        });
    }

    pub fn delete_report(&mut self, report: &TechnicianReport) {
        self.changes.push(Change::DeleteReport {
            id: report.report_id,
            expected_version: report.version,
        });
    }

    pub fn enqueue_outbox(&mut self, message: OutboxMessage) {
        self.changes.push(Change::EnqueueOutbox(message));
    }
}
