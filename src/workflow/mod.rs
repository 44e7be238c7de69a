//! Workflow services.
//!
//! - `report_state`: the technician report state machine
//! - `coupon_usage`: the shared coupon usage counter
//! - `orchestrator`: report operations across report, order and coupon
//! - `repair_orders`: customer-facing repair order management
//! - `coupons`: the admin coupon catalogue
//! - `payment_methods`: the admin payment method catalogue

pub mod coupon_usage;
pub mod coupons;
pub mod orchestrator;
pub mod payment_methods;
pub mod repair_orders;
pub mod report_state;

use chrono::{NaiveDate, Utc};

pub use coupon_usage::CouponUsage;
pub use coupons::CouponService;
pub use orchestrator::ReportWorkflow;
pub use payment_methods::PaymentMethodService;
pub use repair_orders::RepairOrderService;

/// Calendar date used for expiry and service-date checks.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
