//! Delivery credit counter
//!
//! Thin wrapper over the account store's atomic increment and
//! decrement-if-positive primitives. Settlement consumes through the per-event
//! variant so a redelivered payment never takes a second credit. The counter is unsigned and every change
//! goes through a single locked update, so it can never go below zero and
//! concurrent grants and consumes never lose an update.

use crate::core::traits::{AccountStore, CreditConsumption, StoreResult};
use std::num::NonZeroU32;
use std::sync::Arc;

#[derive(Clone)]
pub struct CreditAccount {
    accounts: Arc<dyn AccountStore>,
}

impl CreditAccount {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Add `credits` to the customer's balance
    ///
    /// # Returns
    ///
    /// The new balance. Unknown customers yield `USER_NOT_FOUND`; a balance
    /// that would overflow yields `CREDIT_OVERFLOW` and is left unchanged.
    pub async fn grant(&self, customer_id: &str, credits: NonZeroU32) -> StoreResult<u32> {
        let balance = self
            .accounts
            .increment_credits(customer_id, credits.get())
            .await?;
        tracing::info!(customer = %customer_id, credits = credits.get(), balance, "Granted delivery credits");
        Ok(balance)
    }

    /// Take one credit if the customer has any
    ///
    /// Returns whether a credit was consumed. Unknown customers have no
    /// credit to consume.
    pub async fn consume_if_available(&self, customer_id: &str) -> StoreResult<bool> {
        match self.accounts.decrement_credit_if_positive(customer_id).await? {
            Some(balance) => {
                tracing::info!(customer = %customer_id, balance, "Consumed delivery credit");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Take one credit for the order paid by `event_id`
    ///
    /// Returns whether the order's delivery is covered by a credit. Repeated
    /// calls for the same event return the first answer and never take
    /// another credit.
    pub async fn consume_for_event(&self, customer_id: &str, event_id: &str) -> StoreResult<bool> {
        let consumption = self
            .accounts
            .consume_credit_for_event(customer_id, event_id)
            .await?;
        match consumption {
            CreditConsumption::Consumed { balance } => {
                tracing::info!(customer = %customer_id, event_id = %event_id, balance, "Consumed delivery credit");
            }
            CreditConsumption::Recorded { consumed } => {
                tracing::debug!(customer = %customer_id, event_id = %event_id, consumed, "Credit decision already recorded");
            }
            CreditConsumption::NoCredit => {}
        }
        Ok(consumption.consumed())
    }

    /// Current balance, zero for unknown customers
    pub async fn available(&self, customer_id: &str) -> StoreResult<u32> {
        Ok(self
            .accounts
            .get(customer_id)
            .await?
            .map(|account| account.free_delivery_credits)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::InMemoryAccountStore;

    fn credits(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    async fn credit_account() -> CreditAccount {
        let store = Arc::new(InMemoryAccountStore::new());
        store.get_or_create("d").await.unwrap();
        CreditAccount::new(store)
    }

    #[tokio::test]
    async fn test_grant_then_consume() {
        let account = credit_account().await;

        assert_eq!(account.grant("d", credits(2)).await.unwrap(), 2);
        assert!(account.consume_if_available("d").await.unwrap());
        assert_eq!(account.available("d").await.unwrap(), 1);
        assert!(account.consume_if_available("d").await.unwrap());
        assert!(!account.consume_if_available("d").await.unwrap());
        assert_eq!(account.available("d").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_customer() {
        let account = credit_account().await;

        assert_eq!(account.available("ghost").await.unwrap(), 0);
        assert!(!account.consume_if_available("ghost").await.unwrap());
        let error = account.grant("ghost", credits(1)).await.unwrap_err();
        assert_eq!(error.code(), "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_consume_for_event_is_idempotent() {
        let account = credit_account().await;
        account.grant("d", credits(2)).await.unwrap();

        assert!(account.consume_for_event("d", "evt_1").await.unwrap());
        assert!(account.consume_for_event("d", "evt_1").await.unwrap());
        assert_eq!(account.available("d").await.unwrap(), 1);

        assert!(account.consume_for_event("d", "evt_2").await.unwrap());
        assert!(!account.consume_for_event("d", "evt_3").await.unwrap());
        assert_eq!(account.available("d").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumes_never_overdraw() {
        let account = Arc::new(credit_account().await);
        account.grant("d", credits(3)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let account = Arc::clone(&account);
            handles.push(tokio::spawn(async move {
                account.consume_if_available("d").await
            }));
        }

        let mut consumed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                consumed += 1;
            }
        }
        assert_eq!(consumed, 3);
        assert_eq!(account.available("d").await.unwrap(), 0);
    }
}
