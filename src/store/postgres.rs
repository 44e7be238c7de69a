//! PostgreSQL store backed by sqlx.
//!
//! A change set runs inside one transaction. Versioned updates and deletes use
//! `WHERE version = $expected`; zero affected rows aborts the transaction and
//! reports a conflict.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgQueryResult;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Change, ChangeSet, Store};
use crate::db::AppDb;
use crate::error::{StoreError, StoreResult};
use crate::events::{OutboxMessage, RepairOrderCompleted, REPAIR_ORDER_COMPLETED};
use crate::models::{Coupon, PaymentMethod, RepairOrder, TechnicianReport};
use crate::workflow::report_state::ReportStatus;

const REPAIR_ORDER_COLUMNS: &str = "id, customer_id, technician_id, status, item_name, item_condition, \
     issue_description, desired_service_date, payment_method_id, coupon_id, version, created_at, updated_at";

const COUPON_COLUMNS: &str =
    "id, code, discount_amount, max_usage, usage_count, valid_until, version, created_at, updated_at";

const PAYMENT_METHOD_COLUMNS: &str =
    "id, name, method_type, provider, account_number, account_name, version, created_at, updated_at";

const REPORT_COLUMNS: &str = "report_id, repair_order_id, technician_id, diagnosis, action_plan, \
     estimated_cost, estimated_time_seconds, status, version, last_updated_at";

const JOINED_REPORT_COLUMNS: &str = "r.report_id, r.repair_order_id, r.technician_id, r.diagnosis, \
     r.action_plan, r.estimated_cost, r.estimated_time_seconds, r.status, r.version, r.last_updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: AppDb,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let event: RepairOrderCompleted = serde_json::from_value(row.payload)
            .map_err(|e| StoreError::Corrupt(format!("outbox message {}: {}", row.id, e)))?;
        Ok(OutboxMessage {
            id: row.id,
            event,
            created_at: row.created_at,
        })
    }
}

fn expect_one(result: PgQueryResult, entity: &'static str, id: Uuid) -> StoreResult<()> {
    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict { entity, id });
    }
    Ok(())
}

async fn apply(tx: &mut Transaction<'_, Postgres>, change: Change) -> StoreResult<()> {
    match change {
        Change::InsertRepairOrder(o) => {
            sqlx::query(
                r#"
                INSERT INTO repair_orders (id, customer_id, technician_id, status, item_name, item_condition,
                    issue_description, desired_service_date, payment_method_id, coupon_id, version,
                    created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(o.id)
            .bind(o.customer_id)
            .bind(o.technician_id)
            .bind(o.status)
            .bind(&o.item_name)
            .bind(&o.item_condition)
            .bind(&o.issue_description)
            .bind(o.desired_service_date)
            .bind(o.payment_method_id)
            .bind(o.coupon_id)
            .bind(o.version)
            .bind(o.created_at)
            .bind(o.updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Change::UpdateRepairOrder { row: o, expected_version } => {
            let result = sqlx::query(
                r#"
                UPDATE repair_orders
                SET status = $3, item_name = $4, item_condition = $5, issue_description = $6,
                    desired_service_date = $7, payment_method_id = $8, coupon_id = $9,
                    version = $10, updated_at = $11
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(o.id)
            .bind(expected_version)
            .bind(o.status)
            .bind(&o.item_name)
            .bind(&o.item_condition)
            .bind(&o.issue_description)
            .bind(o.desired_service_date)
            .bind(o.payment_method_id)
            .bind(o.coupon_id)
            .bind(o.version)
            .bind(o.updated_at)
            .execute(&mut **tx)
            .await?;
            expect_one(result, "repair order", o.id)?;
        }
        Change::DeleteRepairOrder { id, expected_version } => {
            let result = sqlx::query("DELETE FROM repair_orders WHERE id = $1 AND version = $2")
                .bind(id)
                .bind(expected_version)
                .execute(&mut **tx)
                .await?;
            expect_one(result, "repair order", id)?;
        }
        Change::InsertCoupon(c) => {
            sqlx::query(
                r#"
                INSERT INTO coupons (id, code, discount_amount, max_usage, usage_count, valid_until,
                    version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(c.id)
            .bind(&c.code)
            .bind(c.discount_amount)
            .bind(c.max_usage)
            .bind(c.usage_count)
            .bind(c.valid_until)
            .bind(c.version)
            .bind(c.created_at)
            .bind(c.updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Change::UpdateCoupon { row: c, expected_version } => {
            let result = sqlx::query(
                r#"
                UPDATE coupons
                SET code = $3, discount_amount = $4, max_usage = $5, usage_count = $6,
                    valid_until = $7, version = $8, updated_at = $9
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(c.id)
            .bind(expected_version)
            .bind(&c.code)
            .bind(c.discount_amount)
            .bind(c.max_usage)
            .bind(c.usage_count)
            .bind(c.valid_until)
            .bind(c.version)
            .bind(c.updated_at)
            .execute(&mut **tx)
            .await?;
            expect_one(result, "coupon", c.id)?;
        }
        Change::DeleteCoupon { id, expected_version } => {
            let result = sqlx::query("DELETE FROM coupons WHERE id = $1 AND version = $2")
                .bind(id)
                .bind(expected_version)
                .execute(&mut **tx)
                .await?;
            expect_one(result, "coupon", id)?;
        }
        Change::InsertPaymentMethod(m) => {
            sqlx::query(
                r#"
                INSERT INTO payment_methods (id, name, method_type, provider, account_number, account_name,
                    version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(m.id)
            .bind(&m.name)
            .bind(m.method_type)
            .bind(&m.provider)
            .bind(&m.account_number)
            .bind(&m.account_name)
            .bind(m.version)
            .bind(m.created_at)
            .bind(m.updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Change::UpdatePaymentMethod { row: m, expected_version } => {
            let result = sqlx::query(
                r#"
                UPDATE payment_methods
                SET name = $3, method_type = $4, provider = $5, account_number = $6, account_name = $7,
                    version = $8, updated_at = $9
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(m.id)
            .bind(expected_version)
            .bind(&m.name)
            .bind(m.method_type)
            .bind(&m.provider)
            .bind(&m.account_number)
            .bind(&m.account_name)
            .bind(m.version)
            .bind(m.updated_at)
            .execute(&mut **tx)
            .await?;
            expect_one(result, "payment method", m.id)?;
        }
        Change::DeletePaymentMethod { id, expected_version } => {
            let result = sqlx::query("DELETE FROM payment_methods WHERE id = $1 AND version = $2")
                .bind(id)
                .bind(expected_version)
                .execute(&mut **tx)
                .await?;
            expect_one(result, "payment method", id)?;
        }
        Change::InsertReport(r) => {
            sqlx::query(
                r#"
                INSERT INTO technician_reports (report_id, repair_order_id, technician_id, diagnosis,
                    action_plan, estimated_cost, estimated_time_seconds, status, version, last_updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(r.report_id)
            .bind(r.repair_order_id)
            .bind(r.technician_id)
            .bind(&r.diagnosis)
            .bind(&r.action_plan)
            .bind(r.estimated_cost)
            .bind(r.estimated_time_seconds)
            .bind(r.status)
            .bind(r.version)
            .bind(r.last_updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Change::UpdateReport { row: r, expected_version } => {
            let result = sqlx::query(
                r#"
                UPDATE technician_reports
                SET diagnosis = $3, action_plan = $4, estimated_cost = $5, estimated_time_seconds = $6,
                    status = $7, version = $8, last_updated_at = $9
                WHERE report_id = $1 AND version = $2
                "#,
            )
            .bind(r.report_id)
            .bind(expected_version)
            .bind(&r.diagnosis)
            .bind(&r.action_plan)
            .bind(r.estimated_cost)
            .bind(r.estimated_time_seconds)
            .bind(r.status)
            .bind(r.version)
            .bind(r.last_updated_at)
            .execute(&mut **tx)
            .await?;
            expect_one(result, "technician report", r.report_id)?;
        }
        Change::DeleteReport { id, expected_version } => {
            let result = sqlx::query("DELETE FROM technician_reports WHERE report_id = $1 AND version = $2")
                .bind(id)
                .bind(expected_version)
                .execute(&mut **tx)
                .await?;
            expect_one(result, "technician report", id)?;
        }
        Change::EnqueueOutbox(message) => {
            let payload = serde_json::to_value(&message.event)
                .map_err(|e| StoreError::Corrupt(format!("outbox message {}: {}", message.id, e)))?;
            sqlx::query(
                r#"
                INSERT INTO outbox_events (id, event_type, payload, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(message.id)
            .bind(REPAIR_ORDER_COMPLETED)
            .bind(payload)
            .bind(message.created_at)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn find_repair_order(&self, id: Uuid) -> StoreResult<Option<RepairOrder>> {
        let sql = format!("SELECT {} FROM repair_orders WHERE id = $1", REPAIR_ORDER_COLUMNS);
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_repair_orders_by_customer(&self, customer_id: Uuid) -> StoreResult<Vec<RepairOrder>> {
        let sql = format!(
            "SELECT {} FROM repair_orders WHERE customer_id = $1 ORDER BY created_at",
            REPAIR_ORDER_COLUMNS
        );
        Ok(sqlx::query_as(&sql).bind(customer_id).fetch_all(&self.pool).await?)
    }

    async fn list_repair_orders_by_technician(&self, technician_id: Uuid) -> StoreResult<Vec<RepairOrder>> {
        let sql = format!(
            "SELECT {} FROM repair_orders WHERE technician_id = $1 ORDER BY created_at",
            REPAIR_ORDER_COLUMNS
        );
        Ok(sqlx::query_as(&sql).bind(technician_id).fetch_all(&self.pool).await?)
    }

    async fn find_coupon(&self, id: Uuid) -> StoreResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE id = $1", COUPON_COLUMNS);
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn find_coupon_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE code = $1", COUPON_COLUMNS);
        Ok(sqlx::query_as(&sql).bind(code).fetch_optional(&self.pool).await?)
    }

    async fn list_coupons(&self) -> StoreResult<Vec<Coupon>> {
        let sql = format!("SELECT {} FROM coupons ORDER BY code", COUPON_COLUMNS);
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_payment_method(&self, id: Uuid) -> StoreResult<Option<PaymentMethod>> {
        let sql = format!("SELECT {} FROM payment_methods WHERE id = $1", PAYMENT_METHOD_COLUMNS);
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_payment_methods(&self) -> StoreResult<Vec<PaymentMethod>> {
        let sql = format!("SELECT {} FROM payment_methods ORDER BY created_at", PAYMENT_METHOD_COLUMNS);
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    async fn payment_method_in_use(&self, id: Uuid) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM repair_orders WHERE payment_method_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn find_report(&self, report_id: Uuid) -> StoreResult<Option<TechnicianReport>> {
        let sql = format!("SELECT {} FROM technician_reports WHERE report_id = $1", REPORT_COLUMNS);
        Ok(sqlx::query_as(&sql).bind(report_id).fetch_optional(&self.pool).await?)
    }

    async fn list_reports_by_technician_and_status(
        &self,
        technician_id: Uuid,
        status: ReportStatus,
    ) -> StoreResult<Vec<TechnicianReport>> {
        let sql = format!(
            "SELECT {} FROM technician_reports WHERE technician_id = $1 AND status = $2 ORDER BY last_updated_at",
            REPORT_COLUMNS
        );
        Ok(sqlx::query_as(&sql)
            .bind(technician_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_reports_by_status(&self, status: ReportStatus) -> StoreResult<Vec<TechnicianReport>> {
        let sql = format!(
            "SELECT {} FROM technician_reports WHERE status = $1 ORDER BY last_updated_at",
            REPORT_COLUMNS
        );
        Ok(sqlx::query_as(&sql).bind(status).fetch_all(&self.pool).await?)
    }

    async fn list_reports_by_customer_and_status(
        &self,
        customer_id: Uuid,
        status: ReportStatus,
    ) -> StoreResult<Vec<TechnicianReport>> {
        let sql = format!(
            r#"
            SELECT {} FROM technician_reports r
            JOIN repair_orders o ON o.id = r.repair_order_id
            WHERE o.customer_id = $1 AND r.status = $2
            ORDER BY r.last_updated_at
            "#,
            JOINED_REPORT_COLUMNS
        );
        Ok(sqlx::query_as(&sql)
            .bind(customer_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn has_active_report(&self, repair_order_id: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM technician_reports WHERE repair_order_id = $1 AND status <> $2)",
        )
        .bind(repair_order_id)
        .bind(ReportStatus::Rejected)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for change in changes.into_changes() {
            // Dropping `tx` on error rolls the whole set back.
            apply(&mut tx, change).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, payload, created_at FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    async fn mark_outbox_published(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE outbox_events SET published_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
