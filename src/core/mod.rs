//! Core business logic module
//!
//! This module contains the settlement components:
//! - `traits` - Repository abstractions and the payment-session gateway
//! - `memory` - In-memory `DashMap` implementations of the repositories
//! - `referral_code` - Referral code generation and normalization
//! - `referral_ledger` - Referral validation, redemption and code assignment
//! - `credit_account` - Delivery credit counter
//! - `customers` - Account creation
//! - `checkout` - Pre-payment checkout intent builder
//! - `processor` - Payment event settlement state machine
//! - `services` - Wiring of all components over shared stores

pub mod checkout;
pub mod credit_account;
pub mod customers;
pub mod memory;
pub mod processor;
pub mod referral_code;
pub mod referral_ledger;
pub mod services;
pub mod traits;

pub use checkout::{CheckoutIntent, CheckoutIntentBuilder, CheckoutRequest, StartedCheckout};
pub use credit_account::CreditAccount;
pub use customers::CustomerRegistry;
pub use memory::{InMemoryAccountStore, InMemoryEventStore, InMemoryOrderStore};
pub use processor::PaymentEventProcessor;
pub use referral_code::ReferralCodeGenerator;
pub use referral_ledger::ReferralLedger;
pub use services::SettlementServices;
pub use traits::{
    AccountStore, CreditConsumption, EventClaim, EventState, OrderInsert, OrderStore, PaymentSession,
    PaymentSessionGateway, PaymentSessionRequest, ProcessedEvent, ProcessedEventStore,
    StoreResult,
};
