//! Settlement progress and outcomes
//!
//! Settlement of one event runs as a sequence of steps. [`SettlementProgress`]
//! records which steps have completed so that a released event resumes where
//! the failed attempt stopped. [`SettlementReport`] is the final audit record
//! stored against a processed event.

use super::account::CustomerId;
use super::event::EventId;
use super::order::OrderId;
use super::referral::ReferralRejection;
use serde::{Deserialize, Serialize};

/// What happened to the referral cited by a settled payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralSettlement {
    /// The payment carried no usable referral metadata
    NotRequested,
    /// The redemption was applied by this settlement
    Redeemed { code: String, referrer: CustomerId },
    /// The redemption had already been applied for this pair
    AlreadyApplied { code: String, referrer: CustomerId },
    /// The redemption failed a rule and was skipped
    Skipped {
        code: String,
        reason: ReferralRejection,
    },
}

impl ReferralSettlement {
    /// Whether this settlement changed referral state
    pub fn is_redeemed(&self) -> bool {
        matches!(self, ReferralSettlement::Redeemed { .. })
    }
}

/// Steps completed so far for one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementProgress {
    pub order_id: Option<OrderId>,
    pub referral: Option<ReferralSettlement>,
    pub payer_code_ensured: bool,
    /// `Some(consumed)` once the credit step has run
    pub credit_applied: Option<bool>,
}

/// Audit record of a fully settled event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub event_id: EventId,
    pub customer: CustomerId,
    pub order_id: OrderId,
    pub referral: ReferralSettlement,
    pub delivery_credit_consumed: bool,
}

/// Result of handing one event to the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// All settlement steps completed by this call
    Settled(SettlementReport),
    /// The event was already processed or is being processed by another call
    Duplicate { event_id: EventId },
    /// The event needs no settlement and was acknowledged
    Ignored { event_id: EventId, reason: String },
}

impl SettlementOutcome {
    pub fn event_id(&self) -> &str {
        match self {
            SettlementOutcome::Settled(report) => &report.event_id,
            SettlementOutcome::Duplicate { event_id } => event_id,
            SettlementOutcome::Ignored { event_id, .. } => event_id,
        }
    }

    /// Stable outcome name used in logs
    pub fn code(&self) -> &'static str {
        match self {
            SettlementOutcome::Settled(_) => "SETTLED",
            SettlementOutcome::Duplicate { .. } => "DUPLICATE_EVENT",
            SettlementOutcome::Ignored { .. } => "IGNORED",
        }
    }
}
