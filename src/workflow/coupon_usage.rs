//! # Coupon usage counter
//!
//! `usage_count` is shared by every order carrying the coupon, so each write
//! goes through the coupon's `version`. Preconditions are checked against the
//! row as read; a competing writer that got there first surfaces as
//! [`WorkflowError::ConcurrencyConflict`] at commit. Nothing is retried.
//!
//! The `stage_*` functions add the write to a caller's [`ChangeSet`] so the
//! counter moves in the same commit as the order that triggered it.
//! [`CouponUsage`] wraps them for callers that only touch the coupon.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::Coupon;
use crate::store::{ChangeSet, Store};
use crate::workflow::today;

/// Checks that `coupon` can take one more use on `today`, then stages the
/// increment.
pub fn stage_apply(changes: &mut ChangeSet, coupon: &mut Coupon, today: NaiveDate) -> WorkflowResult<()> {
    if coupon.is_expired(today) {
        return Err(WorkflowError::validation("Coupon has expired"));
    }
    if coupon.is_exhausted() {
        return Err(WorkflowError::validation(
            "Coupon has reached its maximum usage limit",
        ));
    }
    coupon.usage_count += 1;
    changes.update_coupon(coupon);
    Ok(())
}

/// Stages a decrement. The counter never drops below zero.
pub fn stage_release(changes: &mut ChangeSet, coupon: &mut Coupon) {
    coupon.usage_count = (coupon.usage_count - 1).max(0);
    changes.update_coupon(coupon);
}

/// Moves one use from `old` to `new`. The new coupon is validated first; if
/// it is not applicable nothing is staged.
pub fn stage_swap(
    changes: &mut ChangeSet,
    new: &mut Coupon,
    old: &mut Coupon,
    today: NaiveDate,
) -> WorkflowResult<()> {
    stage_apply(changes, new, today)?;
    stage_release(changes, old);
    Ok(())
}

/// Commits coupon usage changes on their own.
#[derive(Clone)]
pub struct CouponUsage {
    store: Arc<dyn Store>,
}

impl CouponUsage {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the coupon as persisted after the increment.
    pub async fn apply_usage(&self, mut coupon: Coupon) -> WorkflowResult<Coupon> {
        let mut changes = ChangeSet::new();
        stage_apply(&mut changes, &mut coupon, today())?;
        self.store.commit(changes).await?;
        info!(
            "Coupon {} applied ({}/{})",
            coupon.code, coupon.usage_count, coupon.max_usage
        );
        Ok(coupon)
    }

    pub async fn release_usage(&self, mut coupon: Coupon) -> WorkflowResult<Coupon> {
        let mut changes = ChangeSet::new();
        stage_release(&mut changes, &mut coupon);
        self.store.commit(changes).await?;
        info!(
            "Coupon {} released ({}/{})",
            coupon.code, coupon.usage_count, coupon.max_usage
        );
        Ok(coupon)
    }

    /// Returns `(new, old)` as persisted.
    pub async fn swap_usage(&self, mut new: Coupon, mut old: Coupon) -> WorkflowResult<(Coupon, Coupon)> {
        let mut changes = ChangeSet::new();
        stage_swap(&mut changes, &mut new, &mut old, today())?;
        self.store.commit(changes).await?;
        info!("Coupon usage moved from {} to {}", old.code, new.code);
        Ok((new, old))
    }
}
