//! # Report workflow
//!
//! Every operation runs the same pipeline:
//!
//! 1. authorize the actor against the report or its repair order
//! 2. check the state machine (legality, then field guards)
//! 3. mutate the loaded rows and stage them in one [`ChangeSet`]
//! 4. commit
//! 5. dispatch the audit entry
//!
//! A failure at any step before the commit leaves storage untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditDispatcher};
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{OutboxMessage, RepairOrderCompleted};
use crate::models::{
    Actor, CreateReportDraftRequest, RepairOrder, RepairOrderStatus, ReportDraftFields, ReportView, Role,
    TechnicianReport,
};
use crate::store::{ChangeSet, Store};
use crate::workflow::report_state::{ReportAction, ReportStatus, MAX_ACTION_PLAN_LENGTH, MAX_DIAGNOSIS_LENGTH};

#[derive(Clone)]
pub struct ReportWorkflow {
    store: Arc<dyn Store>,
    audit: AuditDispatcher,
}

impl ReportWorkflow {
    pub fn new(store: Arc<dyn Store>, audit: AuditDispatcher) -> Self {
        Self { store, audit }
    }

    // ========================================================================
    // Drafts
    // ========================================================================

    pub async fn create_draft(
        &self,
        actor: &Actor,
        request: CreateReportDraftRequest,
    ) -> WorkflowResult<TechnicianReport> {
        require_technician(actor)?;
        let mut order = self.load_order(request.repair_order_id).await?;
        if order.technician_id != actor.id {
            return Err(WorkflowError::unauthorized(
                "Only the assigned technician can report on this repair order",
            ));
        }
        if order.status != RepairOrderStatus::PendingConfirmation {
            return Err(WorkflowError::OrderState {
                action: "draft a report for",
                order_id: order.id,
                status: order.status,
            });
        }
        if self.store.has_active_report(order.id).await? {
            return Err(WorkflowError::validation(format!(
                "Repair order {} already has an active report",
                order.id
            )));
        }
        validate_fields(&request.fields)?;

        let mut report = TechnicianReport::draft(order.id, actor.id);
        merge_fields(&mut report, request.fields);

        // Bumping the order's version makes a concurrent edit or delete of
        // the order fail instead of orphaning the draft.
        let mut changes = ChangeSet::new();
        changes.update_repair_order(&mut order);
        changes.insert_report(&report);
        self.store.commit(changes).await?;

        info!("Report {} drafted for repair order {}", report.report_id, order.id);
        self.audit.dispatch(AuditAction::CreateDraft, report.report_id, actor.id);
        Ok(report)
    }

    /// Overwrites the fields present in `fields`; absent fields keep their
    /// current value.
    pub async fn update_draft(
        &self,
        actor: &Actor,
        report_id: Uuid,
        fields: ReportDraftFields,
    ) -> WorkflowResult<TechnicianReport> {
        let mut report = self.load_owned_report(actor, report_id).await?;
        report.status.ensure_modifiable(ReportAction::Update)?;
        validate_fields(&fields)?;

        merge_fields(&mut report, fields);
        report.last_updated_at = chrono::Utc::now();

        let mut changes = ChangeSet::new();
        changes.update_report(&mut report);
        self.store.commit(changes).await?;

        info!("Report {} draft updated", report.report_id);
        self.audit.dispatch(AuditAction::UpdateDraft, report.report_id, actor.id);
        Ok(report)
    }

    pub async fn delete_draft(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<()> {
        let report = self.load_owned_report(actor, report_id).await?;
        report.status.ensure_modifiable(ReportAction::Delete)?;

        let mut changes = ChangeSet::new();
        changes.delete_report(&report);
        self.store.commit(changes).await?;

        info!("Report {} draft deleted", report.report_id);
        self.audit.dispatch(AuditAction::DeleteDraft, report.report_id, actor.id);
        Ok(())
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub async fn submit_draft(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<TechnicianReport> {
        let mut report = self.load_owned_report(actor, report_id).await?;
        report.apply(ReportAction::Submit)?;

        let mut changes = ChangeSet::new();
        changes.update_report(&mut report);
        self.store.commit(changes).await?;

        info!("Report {} submitted", report.report_id);
        self.audit.dispatch(AuditAction::SubmitDraft, report.report_id, actor.id);
        Ok(report)
    }

    pub async fn accept_submission(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<TechnicianReport> {
        self.customer_decision(actor, report_id, ReportAction::Approve).await
    }

    pub async fn reject_submission(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<TechnicianReport> {
        self.customer_decision(actor, report_id, ReportAction::Reject).await
    }

    async fn customer_decision(
        &self,
        actor: &Actor,
        report_id: Uuid,
        action: ReportAction,
    ) -> WorkflowResult<TechnicianReport> {
        require_customer(actor)?;
        let mut report = self.load_report(report_id).await?;
        let order = self.load_order(report.repair_order_id).await?;
        if order.customer_id != actor.id {
            return Err(WorkflowError::unauthorized(
                "Only the customer who placed the repair order can decide on its report",
            ));
        }
        report.apply(action)?;

        let mut changes = ChangeSet::new();
        changes.update_report(&mut report);
        self.store.commit(changes).await?;

        let audit_action = match action {
            ReportAction::Reject => AuditAction::RejectSubmission,
            _ => AuditAction::AcceptSubmission,
        };
        info!("Report {} {} by customer {}", report.report_id, report.status, actor.id);
        self.audit.dispatch(audit_action, report.report_id, actor.id);
        Ok(report)
    }

    pub async fn start_work(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<TechnicianReport> {
        let mut report = self.load_owned_report(actor, report_id).await?;
        let mut order = self.load_order(report.repair_order_id).await?;
        report.apply(ReportAction::StartWork)?;
        order.advance(RepairOrderStatus::InProgress)?;

        let mut changes = ChangeSet::new();
        changes.update_report(&mut report);
        changes.update_repair_order(&mut order);
        self.store.commit(changes).await?;

        info!("Work started on repair order {} (report {})", order.id, report.report_id);
        self.audit.dispatch(AuditAction::StartWork, report.report_id, actor.id);
        Ok(report)
    }

    /// Completes the report and its order, and enqueues the completion event
    /// in the same commit.
    pub async fn complete_work(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<TechnicianReport> {
        let mut report = self.load_owned_report(actor, report_id).await?;
        let mut order = self.load_order(report.repair_order_id).await?;
        report.apply(ReportAction::Complete)?;
        order.advance(RepairOrderStatus::Completed)?;

        let event = RepairOrderCompleted {
            repair_order_id: order.id,
            technician_id: report.technician_id,
            amount: report.estimated_cost.unwrap_or_default(),
            completed_at: report.last_updated_at,
        };

        let mut changes = ChangeSet::new();
        changes.update_report(&mut report);
        changes.update_repair_order(&mut order);
        changes.enqueue_outbox(OutboxMessage::new(event));
        self.store.commit(changes).await?;

        info!("Repair order {} completed (report {})", order.id, report.report_id);
        self.audit.dispatch(AuditAction::CompleteWork, report.report_id, actor.id);
        Ok(report)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Technicians see their own reports. Customers see non-draft reports on
    /// their orders, priced net of the order's coupon. Admins see everything.
    pub async fn list_by_status(&self, actor: &Actor, status: ReportStatus) -> WorkflowResult<Vec<ReportView>> {
        match actor.role {
            Role::Technician => {
                let reports = self
                    .store
                    .list_reports_by_technician_and_status(actor.id, status)
                    .await?;
                Ok(reports.iter().map(ReportView::from).collect())
            }
            Role::Customer => {
                if !status.customer_can_see() {
                    return Err(WorkflowError::validation(
                        "Only report above Draft can be seen by Customer",
                    ));
                }
                let reports = self
                    .store
                    .list_reports_by_customer_and_status(actor.id, status)
                    .await?;
                if reports.is_empty() {
                    return Ok(Vec::new());
                }
                let orders: HashMap<Uuid, RepairOrder> = self
                    .store
                    .list_repair_orders_by_customer(actor.id)
                    .await?
                    .into_iter()
                    .map(|order| (order.id, order))
                    .collect();

                let mut discounts: HashMap<Uuid, i64> = HashMap::new();
                let mut views = Vec::new();
                for report in reports {
                    let Some(order) = orders.get(&report.repair_order_id) else {
                        continue;
                    };
                    let discount = match order.coupon_id {
                        Some(coupon_id) => match discounts.get(&coupon_id) {
                            Some(discount) => *discount,
                            None => {
                                let discount = self.coupon_discount(coupon_id).await?;
                                discounts.insert(coupon_id, discount);
                                discount
                            }
                        },
                        None => 0,
                    };
                    views.push(ReportView::from(&report).with_discount(discount));
                }
                Ok(views)
            }
            Role::Admin => {
                let reports = self.store.list_reports_by_status(status).await?;
                Ok(reports.iter().map(ReportView::from).collect())
            }
        }
    }

    pub async fn get_report(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<ReportView> {
        let report = self.load_report(report_id).await?;
        match actor.role {
            Role::Technician => {
                ensure_owner(actor, &report)?;
                Ok(ReportView::from(&report))
            }
            Role::Customer => {
                let order = self.load_order(report.repair_order_id).await?;
                if order.customer_id != actor.id {
                    return Err(WorkflowError::unauthorized(
                        "This report belongs to another customer's repair order",
                    ));
                }
                if !report.customer_can_see() {
                    return Err(WorkflowError::unauthorized(
                        "Only report above Draft can be seen by Customer",
                    ));
                }
                let discount = match order.coupon_id {
                    Some(coupon_id) => self.coupon_discount(coupon_id).await?,
                    None => 0,
                };
                Ok(ReportView::from(&report).with_discount(discount))
            }
            Role::Admin => Ok(ReportView::from(&report)),
        }
    }

    /// Orders assigned to the technician that still await a report decision.
    pub async fn incoming_orders(&self, actor: &Actor) -> WorkflowResult<Vec<RepairOrder>> {
        require_technician(actor)?;
        let orders = self.store.list_repair_orders_by_technician(actor.id).await?;
        Ok(orders
            .into_iter()
            .filter(|order| order.status == RepairOrderStatus::PendingConfirmation)
            .collect())
    }

    // ========================================================================
    // Loading helpers
    // ========================================================================

    async fn load_report(&self, report_id: Uuid) -> WorkflowResult<TechnicianReport> {
        self.store
            .find_report(report_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("technician report", report_id))
    }

    async fn load_order(&self, id: Uuid) -> WorkflowResult<RepairOrder> {
        self.store
            .find_repair_order(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("repair order", id))
    }

    async fn load_owned_report(&self, actor: &Actor, report_id: Uuid) -> WorkflowResult<TechnicianReport> {
        require_technician(actor)?;
        let report = self.load_report(report_id).await?;
        ensure_owner(actor, &report)?;
        Ok(report)
    }

    /// A coupon deleted after being attached no longer discounts anything.
    async fn coupon_discount(&self, coupon_id: Uuid) -> WorkflowResult<i64> {
        Ok(self
            .store
            .find_coupon(coupon_id)
            .await?
            .map_or(0, |coupon| coupon.discount_amount))
    }
}

// ============================================================================
// Guards
// ============================================================================

fn require_technician(actor: &Actor) -> WorkflowResult<()> {
    if actor.role != Role::Technician {
        return Err(WorkflowError::unauthorized(format!(
            "{} cannot act on technician reports",
            actor.role
        )));
    }
    Ok(())
}

fn require_customer(actor: &Actor) -> WorkflowResult<()> {
    if actor.role != Role::Customer {
        return Err(WorkflowError::unauthorized(format!(
            "{} cannot decide on a submitted report",
            actor.role
        )));
    }
    Ok(())
}

fn ensure_owner(actor: &Actor, report: &TechnicianReport) -> WorkflowResult<()> {
    if report.technician_id != actor.id {
        return Err(WorkflowError::unauthorized("This report belongs to another technician"));
    }
    Ok(())
}

fn validate_fields(fields: &ReportDraftFields) -> WorkflowResult<()> {
    if fields
        .diagnosis
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DIAGNOSIS_LENGTH)
    {
        return Err(WorkflowError::validation(format!(
            "Diagnosis must be at most {} characters",
            MAX_DIAGNOSIS_LENGTH
        )));
    }
    if fields
        .action_plan
        .as_ref()
        .is_some_and(|p| p.chars().count() > MAX_ACTION_PLAN_LENGTH)
    {
        return Err(WorkflowError::validation(format!(
            "Action plan must be at most {} characters",
            MAX_ACTION_PLAN_LENGTH
        )));
    }
    if fields.estimated_cost.is_some_and(|cost| cost < 0) {
        return Err(WorkflowError::validation("Estimated cost cannot be negative"));
    }
    if fields.estimated_time_seconds.is_some_and(|secs| secs <= 0) {
        return Err(WorkflowError::validation("Estimated time must be positive"));
    }
    Ok(())
}

fn merge_fields(report: &mut TechnicianReport, fields: ReportDraftFields) {
    if let Some(diagnosis) = fields.diagnosis {
        report.diagnosis = Some(diagnosis);
    }
    if let Some(action_plan) = fields.action_plan {
        report.action_plan = Some(action_plan);
    }
    if let Some(cost) = fields.estimated_cost {
        report.estimated_cost = Some(cost);
    }
    if let Some(secs) = fields.estimated_time_seconds {
        report.estimated_time_seconds = Some(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_limits() {
        let long = "x".repeat(MAX_DIAGNOSIS_LENGTH + 1);
        let cases = [
            ReportDraftFields {
                diagnosis: Some(long.clone()),
                ..Default::default()
            },
            ReportDraftFields {
                action_plan: Some(long),
                ..Default::default()
            },
            ReportDraftFields {
                estimated_cost: Some(-1),
                ..Default::default()
            },
            ReportDraftFields {
                estimated_time_seconds: Some(0),
                ..Default::default()
            },
        ];
        for fields in cases {
            assert!(matches!(validate_fields(&fields), Err(WorkflowError::Validation(_))));
        }
        assert!(validate_fields(&ReportDraftFields::default()).is_ok());
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut report = TechnicianReport::draft(Uuid::new_v4(), Uuid::new_v4());
        report.diagnosis = Some("Battery swelling".to_string());
        merge_fields(
            &mut report,
            ReportDraftFields {
                estimated_cost: Some(80_000),
                ..Default::default()
            },
        );
        assert_eq!(report.diagnosis.as_deref(), Some("Battery swelling"));
        assert_eq!(report.estimated_cost, Some(80_000));
    }
}
