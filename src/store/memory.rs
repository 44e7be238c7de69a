//! In-memory store.
//!
//! Used by the test suites and for local runs without a database. All tables
//! sit behind one lock, so a commit is applied to a scratch copy and swapped
//! in only if every write passed its version and uniqueness checks.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Change, ChangeSet, Store};
use crate::error::{StoreError, StoreResult};
use crate::events::OutboxMessage;
use crate::models::{Coupon, PaymentMethod, RepairOrder, TechnicianReport};
use crate::workflow::report_state::ReportStatus;

#[derive(Debug, Clone, Default)]
struct Tables {
    repair_orders: HashMap<Uuid, RepairOrder>,
    coupons: HashMap<Uuid, Coupon>,
    payment_methods: HashMap<Uuid, PaymentMethod>,
    reports: HashMap<Uuid, TechnicianReport>,
    /// Unpublished messages only, oldest first.
    outbox: Vec<OutboxMessage>,
    published: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outbox messages already handed to the event sink.
    pub async fn published_outbox_count(&self) -> usize {
        self.tables.read().await.published
    }

    /// Outbox messages still held in memory.
    pub async fn outbox_len(&self) -> usize {
        self.tables.read().await.outbox.len()
    }
}

fn check_version(
    entity: &'static str,
    id: Uuid,
    current: Option<i64>,
    expected: i64,
) -> StoreResult<()> {
    match current {
        Some(version) if version == expected => Ok(()),
        _ => Err(StoreError::Conflict { entity, id }),
    }
}

impl Tables {
    fn check_coupon_code(&self, coupon: &Coupon) -> StoreResult<()> {
        let taken = self
            .coupons
            .values()
            .any(|other| other.id != coupon.id && other.code == coupon.code);
        if taken {
            return Err(StoreError::Duplicate(format!(
                "Coupon code {} already exists",
                coupon.code
            )));
        }
        Ok(())
    }

    fn check_single_active_report(&self, report: &TechnicianReport) -> StoreResult<()> {
        if report.status == ReportStatus::Rejected {
            return Ok(());
        }
        let clash = self.reports.values().any(|other| {
            other.report_id != report.report_id
                && other.repair_order_id == report.repair_order_id
                && other.status != ReportStatus::Rejected
        });
        if clash {
            return Err(StoreError::Duplicate(format!(
                "Repair order {} already has an active technician report",
                report.repair_order_id
            )));
        }
        Ok(())
    }

    fn apply(&mut self, change: Change) -> StoreResult<()> {
        match change {
            Change::InsertRepairOrder(order) => {
                if self.repair_orders.contains_key(&order.id) {
                    return Err(StoreError::Duplicate(format!("Repair order {} already exists", order.id)));
                }
                self.repair_orders.insert(order.id, order);
            }
            Change::UpdateRepairOrder { row, expected_version } => {
                let current = self.repair_orders.get(&row.id).map(|o| o.version);
                check_version("repair order", row.id, current, expected_version)?;
                self.repair_orders.insert(row.id, row);
            }
            Change::DeleteRepairOrder { id, expected_version } => {
                let current = self.repair_orders.get(&id).map(|o| o.version);
                check_version("repair order", id, current, expected_version)?;
                self.repair_orders.remove(&id);
            }
            Change::InsertCoupon(coupon) => {
                if self.coupons.contains_key(&coupon.id) {
                    return Err(StoreError::Duplicate(format!("Coupon {} already exists", coupon.id)));
                }
                self.check_coupon_code(&coupon)?;
                self.coupons.insert(coupon.id, coupon);
            }
            Change::UpdateCoupon { row, expected_version } => {
                let current = self.coupons.get(&row.id).map(|c| c.version);
                check_version("coupon", row.id, current, expected_version)?;
                self.check_coupon_code(&row)?;
                self.coupons.insert(row.id, row);
            }
            Change::DeleteCoupon { id, expected_version } => {
                let current = self.coupons.get(&id).map(|c| c.version);
                check_version("coupon", id, current, expected_version)?;
                self.coupons.remove(&id);
            }
            Change::InsertPaymentMethod(method) => {
                if self.payment_methods.contains_key(&method.id) {
                    return Err(StoreError::Duplicate(format!("Payment method {} already exists", method.id)));
                }
                self.payment_methods.insert(method.id, method);
            }
            Change::UpdatePaymentMethod { row, expected_version } => {
                let current = self.payment_methods.get(&row.id).map(|m| m.version);
                check_version("payment method", row.id, current, expected_version)?;
                self.payment_methods.insert(row.id, row);
            }
            Change::DeletePaymentMethod { id, expected_version } => {
                let current = self.payment_methods.get(&id).map(|m| m.version);
                check_version("payment method", id, current, expected_version)?;
                self.payment_methods.remove(&id);
            }
            Change::InsertReport(report) => {
                if self.reports.contains_key(&report.report_id) {
                    return Err(StoreError::Duplicate(format!(
                        "Technician report {} already exists",
                        report.report_id
                    )));
                }
                self.check_single_active_report(&report)?;
                self.reports.insert(report.report_id, report);
            }
            Change::UpdateReport { row, expected_version } => {
                let current = self.reports.get(&row.report_id).map(|r| r.version);
                check_version("technician report", row.report_id, current, expected_version)?;
                self.check_single_active_report(&row)?;
                self.reports.insert(row.report_id, row);
            }
            Change::DeleteReport { id, expected_version } => {
                let current = self.reports.get(&id).map(|r| r.version);
                check_version("technician report", id, current, expected_version)?;
                self.reports.remove(&id);
            }
            Change::EnqueueOutbox(message) => self.outbox.push(message),
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_repair_order(&self, id: Uuid) -> StoreResult<Option<RepairOrder>> {
        Ok(self.tables.read().await.repair_orders.get(&id).cloned())
    }

    async fn list_repair_orders_by_customer(&self, customer_id: Uuid) -> StoreResult<Vec<RepairOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .repair_orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn list_repair_orders_by_technician(&self, technician_id: Uuid) -> StoreResult<Vec<RepairOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .repair_orders
            .values()
            .filter(|o| o.technician_id == technician_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn find_coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>> {
        Ok(self.tables.read().await.coupons.get(&id).cloned())
    }

    async fn find_coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        let tables = self.tables.read().await;
        Ok(tables.coupons.values().find(|c| c.code == code).cloned())
    }

    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        let tables = self.tables.read().await;
        let mut coupons: Vec<_> = tables.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(coupons)
    }

    async fn find_payment_method(&self, id: Uuid) -> StoreResult<Option<PaymentMethod>> {
        Ok(self.tables.read().await.payment_methods.get(&id).cloned())
    }

    async fn list_payment_methods(&self) -> StoreResult<Vec<PaymentMethod>> {
        let tables = self.tables.read().await;
        let mut methods: Vec<_> = tables.payment_methods.values().cloned().collect();
        methods.sort_by_key(|m| m.created_at);
        Ok(methods)
    }

    async fn payment_method_in_use(&self, id: Uuid) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.repair_orders.values().any(|o| o.payment_method_id == id))
    }

    async fn find_report(&self, report_id: Uuid) -> StoreResult<Option<TechnicianReport>> {
        Ok(self.tables.read().await.reports.get(&report_id).cloned())
    }

    async fn list_reports_by_technician_and_status(
        &self,
        technician_id: Uuid,
        status: ReportStatus,
    ) -> StoreResult<Vec<TechnicianReport>> {
        let tables = self.tables.read().await;
        let mut reports: Vec<_> = tables
            .reports
            .values()
            .filter(|r| r.technician_id == technician_id && r.status == status)
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.last_updated_at);
        Ok(reports)
    }

    async fn list_reports_by_status(&self, status: ReportStatus) -> StoreResult<Vec<TechnicianReport>> {
        let tables = self.tables.read().await;
        let mut reports: Vec<_> = tables
            .reports
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.last_updated_at);
        Ok(reports)
    }

    async fn list_reports_by_customer_and_status(
        &self,
        customer_id: Uuid,
        status: ReportStatus,
    ) -> StoreResult<Vec<TechnicianReport>> {
        let tables = self.tables.read().await;
        let mut reports: Vec<_> = tables
            .reports
            .values()
            .filter(|r| {
                r.status == status
                    && tables
                        .repair_orders
                        .get(&r.repair_order_id)
                        .is_some_and(|o| o.customer_id == customer_id)
            })
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.last_updated_at);
        Ok(reports)
    }

    async fn has_active_report(&self, repair_order_id: Uuid) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables
            .reports
            .values()
            .any(|r| r.repair_order_id == repair_order_id && r.status != ReportStatus::Rejected))
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables.write().await;
        let mut scratch = tables.clone();
        for change in changes.into_changes() {
            scratch.apply(change)?;
        }
        *tables = scratch;
        Ok(())
    }

    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>> {
        let tables = self.tables.read().await;
        Ok(tables.outbox.iter().take(limit).cloned().collect())
    }

    /// Drops the message; marking an already published one is a no-op.
    async fn mark_outbox_published(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(index) = tables.outbox.iter().position(|m| m.id == id) {
            tables.outbox.remove(index);
            tables.published += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn coupon(code: &str) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_amount: 10_000,
            max_usage: 3,
            usage_count: 0,
            valid_until: NaiveDate::from_ymd_opt(2099, 1, 1),
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn order(customer_id: Uuid, technician_id: Uuid) -> RepairOrder {
        RepairOrder {
            id: Uuid::new_v4(),
            customer_id,
            technician_id,
            status: crate::models::RepairOrderStatus::PendingConfirmation,
            item_name: "Phone".to_string(),
            item_condition: "Cracked".to_string(),
            issue_description: "Touch screen unresponsive".to_string(),
            desired_service_date: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            payment_method_id: Uuid::new_v4(),
            coupon_id: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_stale_version_rejects_whole_change_set() {
        let store = MemoryStore::new();
        let first = coupon("FIRST001");
        let second = coupon("SECOND02");
        let mut seed = ChangeSet::new();
        seed.insert_coupon(&first);
        seed.insert_coupon(&second);
        store.commit(seed).await.unwrap();

        let mut fresh = first.clone();
        fresh.usage_count = 1;
        let mut stale = second.clone();
        stale.version = 7;
        stale.usage_count = 1;

        let mut changes = ChangeSet::new();
        changes.update_coupon(&mut fresh);
        changes.update_coupon(&mut stale);

        let err = store.commit(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "coupon", id } if id == second.id));

        let untouched = store.find_coupon(first.id).await.unwrap().unwrap();
        assert_eq!(untouched.usage_count, 0);
        assert_eq!(untouched.version, 0);
    }

    #[tokio::test]
    async fn test_empty_change_set_is_a_no_op() {
        let store = MemoryStore::new();
        let changes = ChangeSet::new();
        assert!(changes.is_empty());
        store.commit(changes).await.unwrap();
        assert!(store.list_coupons().await.unwrap().is_empty());
        assert_eq!(store.outbox_len().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_coupon_code_is_rejected() {
        let store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.insert_coupon(&coupon("SAMECODE"));
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.insert_coupon(&coupon("SAMECODE"));
        assert!(matches!(store.commit(changes).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_second_active_report_for_order_is_rejected() {
        let store = MemoryStore::new();
        let order_id = Uuid::new_v4();
        let technician_id = Uuid::new_v4();

        let mut rejected = TechnicianReport::draft(order_id, technician_id);
        rejected.status = ReportStatus::Rejected;
        let mut changes = ChangeSet::new();
        changes.insert_report(&rejected);
        changes.insert_report(&TechnicianReport::draft(order_id, technician_id));
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.insert_report(&TechnicianReport::draft(order_id, technician_id));
        assert!(matches!(store.commit(changes).await, Err(StoreError::Duplicate(_))));
        assert!(store.has_active_report(order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_outbox_drains_in_order() {
        use crate::events::RepairOrderCompleted;

        let store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        let mut ids = Vec::new();
        for amount in [100, 200] {
            let message = OutboxMessage::new(RepairOrderCompleted {
                repair_order_id: Uuid::new_v4(),
                technician_id: Uuid::new_v4(),
                amount,
                completed_at: Utc::now(),
            });
            ids.push(message.id);
            changes.enqueue_outbox(message);
        }
        store.commit(changes).await.unwrap();

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending.iter().map(|m| m.id).collect::<Vec<_>>(), ids);

        store.mark_outbox_published(ids[0]).await.unwrap();
        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.amount, 200);
        assert_eq!(store.published_outbox_count().await, 1);

        store.mark_outbox_published(ids[1]).await.unwrap();
        store.mark_outbox_published(ids[1]).await.unwrap();
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
        assert_eq!(store.outbox_len().await, 0);
        assert_eq!(store.published_outbox_count().await, 2);
    }

    #[tokio::test]
    async fn test_reports_listed_by_customer_and_status() {
        let store = MemoryStore::new();
        let customer = Uuid::new_v4();
        let technician = Uuid::new_v4();
        let mine = order(customer, technician);
        let theirs = order(Uuid::new_v4(), technician);

        let mut submitted = TechnicianReport::draft(mine.id, technician);
        submitted.status = ReportStatus::Submitted;
        let mut other = TechnicianReport::draft(theirs.id, technician);
        other.status = ReportStatus::Submitted;

        let mut changes = ChangeSet::new();
        changes.insert_repair_order(&mine);
        changes.insert_repair_order(&theirs);
        changes.insert_report(&submitted);
        changes.insert_report(&other);
        store.commit(changes).await.unwrap();

        let found = store
            .list_reports_by_customer_and_status(customer, ReportStatus::Submitted)
            .await
            .unwrap();
        assert_eq!(found.iter().map(|r| r.report_id).collect::<Vec<_>>(), vec![submitted.report_id]);
        assert!(store
            .list_reports_by_customer_and_status(customer, ReportStatus::Draft)
            .await
            .unwrap()
            .is_empty());
    }
}
