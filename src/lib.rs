//! Settlement Engine Library
//!
//! # Overview
//!
//! Settles confirmed payments for a referral-driven shop: records the order,
//! redeems the referral code the customer cited at checkout, rewards the
//! referrer with a free-delivery credit, and consumes the payer's own credit
//! when the quote used one. Payment confirmations may arrive more than once
//! and concurrently; every effect happens exactly once per event.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, Order, PaymentEvent, errors)
//! - [`core`] - Business logic components:
//!   - [`core::referral_ledger`] - Referral validation, redemption and code assignment
//!   - [`core::credit_account`] - Delivery credit counter
//!   - [`core::checkout`] - Pre-payment quote and payment session
//!   - [`core::processor`] - Payment event settlement
//!   - [`core::memory`] - In-memory stores behind the repository traits
//! - [`webhook`] - Signature verification and event envelope parsing
//! - [`config`] - Settlement configuration
//! - [`io`], [`strategy`], [`cli`] - Replay of operation logs from CSV
//! - [`telemetry`] - Tracing setup for the binary
//!
//! # Referral rules
//!
//! A code is redeemable when it exists, is not the customer's own, has never
//! been redeemed, and the customer has never been referred. A redemption
//! marks the code, links the two customers and grants the referrer one
//! delivery credit in a single atomic step.

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod strategy;
pub mod telemetry;
pub mod types;
pub mod webhook;

pub use config::SettlementConfig;
pub use self::core::{
    CheckoutIntentBuilder, CreditAccount, CustomerRegistry, PaymentEventProcessor,
    ReferralLedger, SettlementServices,
};
pub use io::{write_accounts_csv, write_orders_csv};
pub use types::{
    Account, CustomerId, EventId, Order, OrderId, PaymentEvent, SettlementError,
    SettlementOutcome,
};
