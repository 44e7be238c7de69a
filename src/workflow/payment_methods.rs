//! Admin payment method catalogue.
//!
//! Repair orders reference a payment method by id. Creating or editing an
//! order with an unknown id is refused, and a method still referenced by an
//! order cannot be deleted.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{Actor, PaymentMethod, PaymentMethodRequest, PaymentMethodType, Role};
use crate::store::{ChangeSet, Store};

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_PROVIDER_LENGTH: usize = 100;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct PaymentMethodService {
    store: Arc<dyn Store>,
}

impl PaymentMethodService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_payment_method(
        &self,
        actor: &Actor,
        request: PaymentMethodRequest,
    ) -> WorkflowResult<PaymentMethod> {
        require_admin(actor)?;
        validate_request(&request)?;

        let now = Utc::now();
        let method = PaymentMethod {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            method_type: request.method_type,
            provider: request.provider.trim().to_string(),
            account_number: request.account_number.trim().to_string(),
            account_name: request.account_name.trim().to_string(),
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let mut changes = ChangeSet::new();
        changes.insert_payment_method(&method);
        self.store.commit(changes).await?;

        info!("Payment method {} created ({})", method.id, method.provider);
        Ok(method)
    }

    pub async fn update_payment_method(
        &self,
        actor: &Actor,
        id: Uuid,
        request: PaymentMethodRequest,
    ) -> WorkflowResult<PaymentMethod> {
        require_admin(actor)?;
        validate_request(&request)?;
        let mut method = self.load(id).await?;

        method.name = request.name.trim().to_string();
        method.method_type = request.method_type;
        method.provider = request.provider.trim().to_string();
        method.account_number = request.account_number.trim().to_string();
        method.account_name = request.account_name.trim().to_string();

        let mut changes = ChangeSet::new();
        changes.update_payment_method(&mut method);
        self.store.commit(changes).await?;

        info!("Payment method {} updated", method.id);
        Ok(method)
    }

    pub async fn delete_payment_method(&self, actor: &Actor, id: Uuid) -> WorkflowResult<()> {
        require_admin(actor)?;
        let method = self.load(id).await?;
        if self.store.payment_method_in_use(method.id).await? {
            return Err(WorkflowError::validation(format!(
                "Payment method {} is still used by a repair order",
                method.id
            )));
        }

        let mut changes = ChangeSet::new();
        changes.delete_payment_method(&method);
        self.store.commit(changes).await?;

        info!("Payment method {} deleted", method.id);
        Ok(())
    }

    /// Readable by any caller so customers can pick one when ordering.
    pub async fn get_payment_method(&self, _actor: &Actor, id: Uuid) -> WorkflowResult<PaymentMethod> {
        self.load(id).await
    }

    pub async fn list_payment_methods(&self, _actor: &Actor) -> WorkflowResult<Vec<PaymentMethod>> {
        Ok(self.store.list_payment_methods().await?)
    }

    async fn load(&self, id: Uuid) -> WorkflowResult<PaymentMethod> {
        self.store
            .find_payment_method(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("payment method", id))
    }
}

fn require_admin(actor: &Actor) -> WorkflowResult<()> {
    if actor.role != Role::Admin {
        return Err(WorkflowError::unauthorized(format!(
            "{} cannot manage payment methods",
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

fn validate_account_number(method_type: PaymentMethodType, number: &str) -> WorkflowResult<()> {
    let (digits, message) = match method_type {
        PaymentMethodType::BankTransfer => (10..=16, "Bank account number must be 10-16 digits"),
        PaymentMethodType::EWallet => (10..=23, "Virtual account number must be 10-23 digits"),
    };
    let number = number.trim();
    if !digits.contains(&number.len()) || !number.chars().all(|c| c.is_ascii_digit()) {
        return Err(WorkflowError::validation(message));
    }
    Ok(())
}

fn validate_request(request: &PaymentMethodRequest) -> WorkflowResult<()> {
    require_text("Name", &request.name, MAX_NAME_LENGTH)?;
    require_text("Provider", &request.provider, MAX_PROVIDER_LENGTH)?;
    require_text("Account name", &request.account_name, MAX_ACCOUNT_NAME_LENGTH)?;
    validate_account_number(request.method_type, &request.account_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_number_length_depends_on_type() {
        let bank = PaymentMethodType::BankTransfer;
        let wallet = PaymentMethodType::EWallet;

        assert!(validate_account_number(bank, "1234567890").is_ok());
        assert!(validate_account_number(bank, &"1".repeat(16)).is_ok());
        assert!(validate_account_number(bank, &"1".repeat(17)).is_err());
        assert!(validate_account_number(wallet, &"1".repeat(23)).is_ok());
        assert!(validate_account_number(wallet, "123456789").is_err());

        let err = validate_account_number(bank, "12345-67890").unwrap_err();
        assert_eq!(err.to_string(), "Bank account number must be 10-16 digits");
    }

    #[test]
    fn test_blank_fields_rejected() {
        let request = PaymentMethodRequest {
            name: "BCA".to_string(),
            method_type: PaymentMethodType::BankTransfer,
            provider: "Bank Central Asia".to_string(),
            account_number: "8800123456".to_string(),
            account_name: "Repair Co".to_string(),
        };
        assert!(validate_request(&request).is_ok());

        let blank = PaymentMethodRequest {
            provider: "   ".to_string(),
            ..request
        };
        let err = validate_request(&blank).unwrap_err();
        assert_eq!(err.to_string(), "Provider is required");
    }
}
