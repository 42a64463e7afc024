//! Core traits for account, order and processed-event storage
//!
//! This module defines the repository abstractions that every settlement
//! component receives explicitly. Each trait exposes only atomic primitives:
//! conditional field sets, checked increments and claim-if-absent. Callers
//! never read a record and then write it back unguarded.
//!
//! All traits are async and object safe so components can hold them as
//! `Arc<dyn Trait>` and swap the in-memory implementations for real drivers.

use crate::types::{
    Account, CodeAssignment, CustomerId, EventId, Order, OrderItem, RedemptionCommit,
    SettlementError, SettlementProgress, SettlementReport,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Result type for storage operations
pub type StoreResult<T> = Result<T, SettlementError>;

/// Per-customer account storage
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch a snapshot of an account
    async fn get(&self, customer: &str) -> StoreResult<Option<Account>>;

    /// Fetch an account, creating a blank one if absent
    ///
    /// Returns the account and whether this call created it.
    async fn get_or_create(&self, customer: &str) -> StoreResult<(Account, bool)>;

    /// Find the account owning a referral code
    async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<Account>>;

    /// Set the account's referral code if it has none
    ///
    /// Writes nothing when the account already has a code or when another
    /// account owns `code`. Fails with `USER_NOT_FOUND` for unknown customers.
    async fn assign_referral_code_if_absent(
        &self,
        customer: &str,
        code: &str,
    ) -> StoreResult<CodeAssignment>;

    /// Atomically add `credits` to the account's delivery credits
    ///
    /// Returns the new balance. Overflow is an error and leaves the balance
    /// unchanged.
    async fn increment_credits(&self, customer: &str, credits: u32) -> StoreResult<u32>;

    /// Atomically take one credit if the balance is positive
    ///
    /// Returns the new balance, or `None` when nothing was taken (zero balance
    /// or unknown customer).
    async fn decrement_credit_if_positive(&self, customer: &str) -> StoreResult<Option<u32>>;

    /// Take one credit on behalf of a payment event, at most once per event
    ///
    /// The decision (taken or not) is recorded against `event_id` under the
    /// same lock as the balance change. Later calls for the same event return
    /// that decision without touching the balance. Unknown customers yield
    /// `NoCredit` and record nothing.
    async fn consume_credit_for_event(
        &self,
        customer: &str,
        event_id: &str,
    ) -> StoreResult<CreditConsumption>;

    /// Apply a referral redemption to both accounts as one unit
    ///
    /// Re-checks every redemption rule against the locked records. On success
    /// the referrer's code is marked redeemed by `customer`, the customer's
    /// `referred_by` is set to `referrer` and the referrer gains one credit.
    /// Fails with `ReferralRejected` when a rule no longer holds; nothing is
    /// written in that case.
    async fn commit_redemption(
        &self,
        code: &str,
        referrer: &str,
        customer: &str,
    ) -> StoreResult<RedemptionCommit>;

    /// Snapshot of every account
    async fn all(&self) -> StoreResult<Vec<Account>>;
}

/// Result of an order insert keyed by source event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderInsert {
    /// The order was stored by this call
    Created(Order),
    /// An order for the same event already existed; it is returned unchanged
    Existing(Order),
}

impl OrderInsert {
    pub fn order(&self) -> &Order {
        match self {
            OrderInsert::Created(order) | OrderInsert::Existing(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            OrderInsert::Created(order) | OrderInsert::Existing(order) => order,
        }
    }
}

/// Result of consuming a delivery credit for a payment event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditConsumption {
    /// One credit was taken by this call; carries the new balance
    Consumed { balance: u32 },
    /// The customer had no credit to take
    NoCredit,
    /// An earlier call already decided this event
    Recorded { consumed: bool },
}

impl CreditConsumption {
    /// Whether the event's order got its delivery paid by a credit
    pub fn consumed(&self) -> bool {
        matches!(
            self,
            CreditConsumption::Consumed { .. } | CreditConsumption::Recorded { consumed: true }
        )
    }
}

/// Append-only order storage
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Store an order unless one already exists for its source event
    async fn insert_if_absent(&self, order: Order) -> StoreResult<OrderInsert>;

    async fn find_by_event(&self, event_id: &str) -> StoreResult<Option<Order>>;

    async fn list_for_customer(&self, customer: &str) -> StoreResult<Vec<Order>>;

    async fn all(&self) -> StoreResult<Vec<Order>>;
}

/// Lifecycle state of a processed-event record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// A settlement attempt holds the event until its lease expires
    InFlight,
    /// The last attempt failed; the event may be claimed again
    Released,
    /// Every settlement step completed
    Processed,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::InFlight => "IN_FLIGHT",
            EventState::Released => "RELEASED",
            EventState::Processed => "PROCESSED",
        }
    }
}

/// Idempotency record for one payment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub event_id: EventId,
    pub state: EventState,
    pub progress: SettlementProgress,
    pub attempts: u32,
    pub report: Option<SettlementReport>,
    pub claimed_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Result of claiming an event id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventClaim {
    /// This caller owns the event; carries progress from earlier attempts
    Acquired(SettlementProgress),
    /// Another caller is settling the event right now
    InFlight,
    /// The event was fully settled earlier
    Processed(Option<SettlementReport>),
}

/// Idempotency gate over payment event ids
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Atomically claim the event if it is unseen, released, or held by a
    /// claim whose lease has expired
    ///
    /// A taken-over attempt may still be running, so every settlement step
    /// must tolerate being applied twice for the same event.
    async fn claim(&self, event_id: &str) -> StoreResult<EventClaim>;

    /// Persist progress for an event this caller holds
    async fn record_progress(&self, event_id: &str, progress: &SettlementProgress)
        -> StoreResult<()>;

    /// Mark the event processed with its final report
    async fn complete(&self, event_id: &str, report: &SettlementReport) -> StoreResult<()>;

    /// Give the event back after a failed attempt, keeping its progress
    async fn release(&self, event_id: &str) -> StoreResult<()>;

    async fn get(&self, event_id: &str) -> StoreResult<Option<ProcessedEvent>>;
}

/// Request handed to the payment-session collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSessionRequest {
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub delivery_fee_pence: u32,
    /// Opaque metadata returned verbatim on the confirmation event
    pub metadata: BTreeMap<String, String>,
}

/// A payment session opened by the collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub id: String,
    pub url: Option<String>,
}

/// External payment-session collaborator
#[async_trait]
pub trait PaymentSessionGateway: Send + Sync {
    async fn create_session(&self, request: PaymentSessionRequest) -> StoreResult<PaymentSession>;
}
