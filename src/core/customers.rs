//! Customer registry
//!
//! Creates account records. New customers get a random UUID id; imported
//! customers keep their existing id and, optionally, an existing referral
//! code.

use crate::core::referral_code::normalize_code;
use crate::core::traits::AccountStore;
use crate::types::{Account, CodeAssignment, SettlementError};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct CustomerRegistry {
    accounts: Arc<dyn AccountStore>,
}

impl CustomerRegistry {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Create a customer with a fresh id, zero credits and no code
    pub async fn register(&self) -> Result<Account, SettlementError> {
        let customer = Uuid::new_v4().to_string();
        let (account, _) = self.accounts.get_or_create(&customer).await?;
        tracing::info!(customer = %account.customer, "Registered customer");
        Ok(account)
    }

    /// Create (or fetch) a customer with a known id
    ///
    /// When `referral_code` is given it is assigned unless the account already
    /// has a code, in which case the existing code is kept.
    ///
    /// # Errors
    ///
    /// `REFERRAL_CODE_TAKEN` when another account owns `referral_code`. The
    /// account itself is still created.
    pub async fn register_with_id(
        &self,
        customer_id: &str,
        referral_code: Option<&str>,
    ) -> Result<Account, SettlementError> {
        let (account, created) = self.accounts.get_or_create(customer_id).await?;
        if created {
            tracing::info!(customer = %customer_id, "Registered customer");
        }

        let Some(code) = referral_code.and_then(normalize_code) else {
            return Ok(account);
        };

        match self
            .accounts
            .assign_referral_code_if_absent(customer_id, &code)
            .await?
        {
            CodeAssignment::Assigned(_) => {}
            CodeAssignment::AlreadyAssigned(existing) => {
                if existing != code {
                    tracing::warn!(
                        customer = %customer_id,
                        existing = %existing,
                        requested = %code,
                        "Customer already has a referral code; keeping it"
                    );
                }
            }
            CodeAssignment::CodeTaken => {
                return Err(SettlementError::referral_code_taken(&code));
            }
        }

        self.accounts
            .get(customer_id)
            .await?
            .ok_or_else(|| SettlementError::user_not_found(customer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::InMemoryAccountStore;

    fn registry() -> CustomerRegistry {
        CustomerRegistry::new(Arc::new(InMemoryAccountStore::new()))
    }

    #[tokio::test]
    async fn test_register_assigns_uuid() {
        let registry = registry();

        let first = registry.register().await.unwrap();
        let second = registry.register().await.unwrap();

        assert!(Uuid::parse_str(&first.customer).is_ok());
        assert_ne!(first.customer, second.customer);
        assert_eq!(first.free_delivery_credits, 0);
        assert!(first.referral_code.is_none());
    }

    #[tokio::test]
    async fn test_register_with_imported_code() {
        let registry = registry();

        let account = registry.register_with_id("a", Some("jc-aaaaa")).await.unwrap();
        assert_eq!(account.referral_code.as_deref(), Some("JC-AAAAA"));

        let again = registry.register_with_id("a", Some("JC-BBBBB")).await.unwrap();
        assert_eq!(again.referral_code.as_deref(), Some("JC-AAAAA"));
    }

    #[tokio::test]
    async fn test_register_with_taken_code() {
        let registry = registry();
        registry.register_with_id("a", Some("JC-AAAAA")).await.unwrap();

        let error = registry
            .register_with_id("b", Some("JC-AAAAA"))
            .await
            .unwrap_err();
        assert_eq!(error, SettlementError::referral_code_taken("JC-AAAAA"));
        assert_eq!(error.code(), "REFERRAL_CODE_TAKEN");
    }
}
