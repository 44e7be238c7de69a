//! Customer-facing repair order management.
//!
//! Attaching, replacing or detaching a coupon moves its usage counter in the
//! same commit as the order write.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Actor, Coupon, CreateRepairOrderRequest, RepairOrder, RepairOrderDetails, RepairOrderStatus, Role};
use crate::store::{ChangeSet, Store};
use crate::workflow::coupon_usage::{stage_apply, stage_release, stage_swap};
use crate::workflow::today;

pub const MAX_ITEM_NAME_LENGTH: usize = 100;
pub const MAX_ITEM_CONDITION_LENGTH: usize = 100;
pub const MAX_ISSUE_DESCRIPTION_LENGTH: usize = 500;

#[derive(Clone)]
pub struct RepairOrderService {
    store: Arc<dyn Store>,
}

impl RepairOrderService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_order(&self, actor: &Actor, request: CreateRepairOrderRequest) -> WorkflowResult<RepairOrder> {
        require_customer(actor)?;
        let today = today();
        validate_details(&request.details, today)?;
        self.ensure_payment_method(request.details.payment_method_id).await?;

        let mut changes = ChangeSet::new();
        let coupon_id = match request.details.coupon_code.as_deref() {
            Some(code) => {
                let mut coupon = self.load_coupon_by_code(code).await?;
                stage_apply(&mut changes, &mut coupon, today)?;
                Some(coupon.id)
            }
            None => None,
        };

        let now = Utc::now();
        let details = request.details;
        let order = RepairOrder {
            id: Uuid::new_v4(),
            customer_id: actor.id,
            technician_id: request.technician_id,
            status: RepairOrderStatus::PendingConfirmation,
            item_name: details.item_name.trim().to_string(),
            item_condition: details.item_condition.trim().to_string(),
            issue_description: details.issue_description.trim().to_string(),
            desired_service_date: details.desired_service_date,
            payment_method_id: details.payment_method_id,
            coupon_id,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        changes.insert_repair_order(&order);
        self.store.commit(changes).await?;

        info!(
            "Repair order {} created for customer {} with technician {}",
            order.id, order.customer_id, order.technician_id
        );
        Ok(order)
    }

    pub async fn list_orders(&self, actor: &Actor) -> WorkflowResult<Vec<RepairOrder>> {
        require_customer(actor)?;
        Ok(self.store.list_repair_orders_by_customer(actor.id).await?)
    }

    /// Readable by the owning customer, the assigned technician and admins.
    pub async fn get_order(&self, actor: &Actor, id: Uuid) -> WorkflowResult<RepairOrder> {
        let order = self.load_order(id).await?;
        let allowed = match actor.role {
            Role::Customer => order.customer_id == actor.id,
            Role::Technician => order.technician_id == actor.id,
            Role::Admin => true,
        };
        if !allowed {
            return Err(WorkflowError::unauthorized("This repair order belongs to someone else"));
        }
        Ok(order)
    }

    pub async fn update_order(
        &self,
        actor: &Actor,
        id: Uuid,
        details: RepairOrderDetails,
    ) -> WorkflowResult<RepairOrder> {
        let mut order = self.load_editable_order(actor, id).await?;
        let today = today();
        validate_details(&details, today)?;
        if details.payment_method_id != order.payment_method_id {
            self.ensure_payment_method(details.payment_method_id).await?;
        }

        let mut changes = ChangeSet::new();
        let requested = match details.coupon_code.as_deref() {
            Some(code) => Some(self.load_coupon_by_code(code).await?),
            None => None,
        };

        order.coupon_id = match (order.coupon_id, requested) {
            (Some(current), Some(new)) if current == new.id => Some(current),
            (Some(current), Some(mut new)) => {
                match self.store.find_coupon(current).await? {
                    Some(mut old) => stage_swap(&mut changes, &mut new, &mut old, today)?,
                    None => stage_apply(&mut changes, &mut new, today)?,
                }
                Some(new.id)
            }
            (None, Some(mut new)) => {
                stage_apply(&mut changes, &mut new, today)?;
                Some(new.id)
            }
            (Some(current), None) => {
                if let Some(mut old) = self.store.find_coupon(current).await? {
                    stage_release(&mut changes, &mut old);
                }
                None
            }
            (None, None) => None,
        };

        order.item_name = details.item_name.trim().to_string();
        order.item_condition = details.item_condition.trim().to_string();
        order.issue_description = details.issue_description.trim().to_string();
        order.desired_service_date = details.desired_service_date;
        order.payment_method_id = details.payment_method_id;
        changes.update_repair_order(&mut order);
        self.store.commit(changes).await?;

        info!("Repair order {} updated", order.id);
        Ok(order)
    }

    pub async fn delete_order(&self, actor: &Actor, id: Uuid) -> WorkflowResult<()> {
        let order = self.load_editable_order(actor, id).await?;

        let mut changes = ChangeSet::new();
        if let Some(coupon_id) = order.coupon_id {
            if let Some(mut coupon) = self.store.find_coupon(coupon_id).await? {
                stage_release(&mut changes, &mut coupon);
            }
        }
        changes.delete_repair_order(&order);
        self.store.commit(changes).await?;

        info!("Repair order {} deleted", order.id);
        Ok(())
    }

    async fn load_order(&self, id: Uuid) -> WorkflowResult<RepairOrder> {
        self.store
            .find_repair_order(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("repair order", id))
    }

    /// The owner's order, still pending and not yet reported on.
    async fn load_editable_order(&self, actor: &Actor, id: Uuid) -> WorkflowResult<RepairOrder> {
        require_customer(actor)?;
        let order = self.load_order(id).await?;
        if order.customer_id != actor.id {
            return Err(WorkflowError::unauthorized("This repair order belongs to someone else"));
        }
        if order.status != RepairOrderStatus::PendingConfirmation {
            return Err(WorkflowError::OrderState {
                action: "change",
                order_id: order.id,
                status: order.status,
            });
        }
        if self.store.has_active_report(order.id).await? {
            return Err(WorkflowError::validation(format!(
                "Repair order {} already has a technician report",
                order.id
            )));
        }
        Ok(order)
    }

    async fn ensure_payment_method(&self, id: Uuid) -> WorkflowResult<()> {
        if self.store.find_payment_method(id).await?.is_none() {
            return Err(WorkflowError::validation("Invalid payment method"));
        }
        Ok(())
    }

    async fn load_coupon_by_code(&self, code: &str) -> WorkflowResult<Coupon> {
        let code = code.trim();
        self.store
            .find_coupon_by_code(code)
            .await?
            .ok_or_else(|| WorkflowError::not_found("coupon", code))
    }
}

fn require_customer(actor: &Actor) -> WorkflowResult<()> {
    if actor.role != Role::Customer {
        return Err(WorkflowError::unauthorized(format!(
            "{} cannot manage repair orders",
            actor.role
        )));
    }
    Ok(())
}

fn require_text(field: &str, value: &str, max: usize) -> WorkflowResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(WorkflowError::validation(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(WorkflowError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

fn validate_details(details: &RepairOrderDetails, today: NaiveDate) -> WorkflowResult<()> {
    require_text("Item name", &details.item_name, MAX_ITEM_NAME_LENGTH)?;
    require_text("Item condition", &details.item_condition, MAX_ITEM_CONDITION_LENGTH)?;
    require_text("Issue description", &details.issue_description, MAX_ISSUE_DESCRIPTION_LENGTH)?;
    if details.desired_service_date < today {
        return Err(WorkflowError::validation(
            "Desired service date cannot be in the past",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn details() -> RepairOrderDetails {
        RepairOrderDetails {
            item_name: "Laptop".to_string(),
            item_condition: "Powers on, no display".to_string(),
            issue_description: "Screen stays black after boot".to_string(),
            desired_service_date: today() + Duration::days(3),
            payment_method_id: Uuid::new_v4(),
            coupon_code: None,
        }
    }

    #[test]
    fn test_details_validation() {
        assert!(validate_details(&details(), today()).is_ok());

        let mut blank = details();
        blank.item_name = "  ".to_string();
        assert!(validate_details(&blank, today()).is_err());

        let mut too_long = details();
        too_long.item_condition = "x".repeat(MAX_ITEM_CONDITION_LENGTH + 1);
        assert!(validate_details(&too_long, today()).is_err());

        let mut past = details();
        past.desired_service_date = today() - Duration::days(1);
        let err = validate_details(&past, today()).unwrap_err();
        assert_eq!(err.to_string(), "Desired service date cannot be in the past");
    }
}
