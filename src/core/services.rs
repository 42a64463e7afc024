//! Component wiring
//!
//! Builds every settlement component over one set of stores so that they all
//! observe the same state.

use crate::config::SettlementConfig;
use crate::core::checkout::CheckoutIntentBuilder;
use crate::core::credit_account::CreditAccount;
use crate::core::customers::CustomerRegistry;
use crate::core::memory::{InMemoryAccountStore, InMemoryEventStore, InMemoryOrderStore};
use crate::core::processor::PaymentEventProcessor;
use crate::core::referral_ledger::ReferralLedger;
use crate::core::traits::{AccountStore, OrderStore, ProcessedEventStore};
use std::sync::Arc;

/// All settlement components sharing one set of stores
#[derive(Clone)]
pub struct SettlementServices {
    pub accounts: Arc<dyn AccountStore>,
    pub orders: Arc<dyn OrderStore>,
    pub events: Arc<dyn ProcessedEventStore>,
    pub customers: CustomerRegistry,
    pub ledger: ReferralLedger,
    pub credits: CreditAccount,
    pub checkout: CheckoutIntentBuilder,
    pub processor: PaymentEventProcessor,
}

impl SettlementServices {
    pub fn new(
        config: &SettlementConfig,
        accounts: Arc<dyn AccountStore>,
        orders: Arc<dyn OrderStore>,
        events: Arc<dyn ProcessedEventStore>,
    ) -> Self {
        let ledger = ReferralLedger::new(
            Arc::clone(&accounts),
            config.code_generator(),
            config.referral_code_attempts,
        );
        let credits = CreditAccount::new(Arc::clone(&accounts));
        let customers = CustomerRegistry::new(Arc::clone(&accounts));
        let checkout =
            CheckoutIntentBuilder::new(Arc::clone(&accounts), ledger.clone(), credits.clone());
        let processor = PaymentEventProcessor::new(
            Arc::clone(&accounts),
            Arc::clone(&orders),
            Arc::clone(&events),
            ledger.clone(),
            credits.clone(),
            config.verifier(),
        );

        Self {
            accounts,
            orders,
            events,
            customers,
            ledger,
            credits,
            checkout,
            processor,
        }
    }

    /// Components over fresh in-memory stores
    pub fn in_memory(config: &SettlementConfig) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryEventStore::with_lease(config.claim_lease_secs)),
        )
    }
}
