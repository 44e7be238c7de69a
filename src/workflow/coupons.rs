//! Admin coupon catalogue.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Actor, Coupon, CouponRequest, Role};
use crate::store::{ChangeSet, Store};
use crate::workflow::today;

const MIN_CODE_LENGTH: usize = 6;
const MAX_CODE_LENGTH: usize = 12;

#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn Store>,
}

impl CouponService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_coupon(&self, actor: &Actor, request: CouponRequest) -> WorkflowResult<Coupon> {
        require_admin(actor)?;
        validate_request(&request, today())?;
        self.ensure_code_free(&request.code, None).await?;

        let now = Utc::now();
        let coupon = Coupon {
            id: Uuid::new_v4(),
            code: request.code,
            discount_amount: request.discount_amount,
            max_usage: request.max_usage,
            usage_count: 0,
            valid_until: request.valid_until,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut changes = ChangeSet::new();
        changes.insert_coupon(&coupon);
        self.store.commit(changes).await?;

        info!("Coupon {} created ({} uses)", coupon.code, coupon.max_usage);
        Ok(coupon)
    }

    pub async fn update_coupon(&self, actor: &Actor, id: Uuid, request: CouponRequest) -> WorkflowResult<Coupon> {
        require_admin(actor)?;
        validate_request(&request, today())?;
        let mut coupon = self.load(id).await?;
        if request.max_usage < coupon.usage_count {
            return Err(WorkflowError::validation(format!(
                "Max usage cannot be below the current usage count of {}",
                coupon.usage_count
            )));
        }
        if request.code != coupon.code {
            self.ensure_code_free(&request.code, Some(coupon.id)).await?;
        }

        coupon.code = request.code;
        coupon.discount_amount = request.discount_amount;
        coupon.max_usage = request.max_usage;
        coupon.valid_until = request.valid_until;

        let mut changes = ChangeSet::new();
        changes.update_coupon(&mut coupon);
        self.store.commit(changes).await?;

        info!("Coupon {} updated", coupon.code);
        Ok(coupon)
    }

    /// Coupons still attached to orders cannot be removed.
    pub async fn delete_coupon(&self, actor: &Actor, id: Uuid) -> WorkflowResult<()> {
        require_admin(actor)?;
        let coupon = self.load(id).await?;
        if coupon.usage_count > 0 {
            return Err(WorkflowError::validation(format!(
                "Coupon {} is still applied to {} repair order(s)",
                coupon.code, coupon.usage_count
            )));
        }

        let mut changes = ChangeSet::new();
        changes.delete_coupon(&coupon);
        self.store.commit(changes).await?;

        info!("Coupon {} deleted", coupon.code);
        Ok(())
    }

    pub async fn get_coupon(&self, actor: &Actor, id: Uuid) -> WorkflowResult<Coupon> {
        require_admin(actor)?;
        self.load(id).await
    }

    pub async fn list_coupons(&self, _actor: &Actor) -> WorkflowResult<Vec<Coupon>> {
        Ok(self.store.list_coupons().await?)
    }

    async fn load(&self, id: Uuid) -> WorkflowResult<Coupon> {
        self.store
            .find_coupon(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("coupon", id))
    }

    async fn ensure_code_free(&self, code: &str, except: Option<Uuid>) -> WorkflowResult<()> {
        match self.store.find_coupon_by_code(code).await? {
            Some(existing) if Some(existing.id) != except => Err(WorkflowError::validation(format!(
                "Coupon code {} already exists",
                code
            ))),
            _ => Ok(()),
        }
    }
}

fn require_admin(actor: &Actor) -> WorkflowResult<()> {
    if actor.role != Role::Admin {
        return Err(WorkflowError::unauthorized(format!(
            "{} cannot manage coupons",
            actor.role
        )));
    }
    Ok(())
}

/// Six to twelve upper-case letters or digits.
fn is_valid_code(code: &str) -> bool {
    (MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn validate_request(request: &CouponRequest, today: NaiveDate) -> WorkflowResult<()> {
    if !is_valid_code(&request.code) {
        return Err(WorkflowError::validation(
            "Coupon code must be 6-12 upper-case letters or digits",
        ));
    }
    if request.discount_amount <= 0 {
        return Err(WorkflowError::validation("Discount amount must be positive"));
    }
    if request.max_usage < 1 {
        return Err(WorkflowError::validation("Max usage must be at least 1"));
    }
    if request.valid_until.is_some_and(|until| until < today) {
        return Err(WorkflowError::validation("Valid until cannot be in the past"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_format() {
        for good in ["ABC123", "SUMMER2026", "A1B2C3D4E5F6"] {
            assert!(is_valid_code(good), "{}", good);
        }
        for bad in ["ABC12", "summer2026", "TOOLONGCODE12", "ABC-123", "ÄBCDEF"] {
            assert!(!is_valid_code(bad), "{}", bad);
        }
    }

    #[test]
    fn test_request_validation() {
        let valid = CouponRequest {
            code: "WELCOME10".to_string(),
            discount_amount: 10_000,
            max_usage: 100,
            valid_until: None,
        };
        assert!(validate_request(&valid, today()).is_ok());

        let zero_discount = CouponRequest {
            discount_amount: 0,
            ..valid.clone()
        };
        let no_uses = CouponRequest {
            max_usage: 0,
            ..valid.clone()
        };
        let expired = CouponRequest {
            valid_until: today().pred_opt(),
            ..valid
        };
        for request in [zero_discount, no_uses, expired] {
            assert!(matches!(
                validate_request(&request, today()),
                Err(WorkflowError::Validation(_))
            ));
        }
    }
}
