//! Payment-confirmation events
//!
//! A [`PaymentEvent`] is the verified, parsed form of a webhook delivery from
//! the payment collaborator. [`CheckoutMetadata`] is the opaque string map the
//! checkout step attaches to the payment session and the processor reads back.

use super::account::CustomerId;
use super::order::OrderItem;
use std::collections::BTreeMap;
use std::fmt;

/// Payment processor event identifier
pub type EventId = String;

pub const META_CUSTOMER_ID: &str = "customerId";
pub const META_REFERRAL_CODE: &str = "referralCode";
pub const META_REFERRER_ID: &str = "referrerId";
pub const META_DELIVERY_FEE_PENCE: &str = "deliveryFeePence";

/// Event type as delivered by the payment collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `checkout.session.completed`, the only type that triggers settlement
    CheckoutSessionCompleted,
    /// Any other event type, acknowledged and ignored
    Other(String),
}

impl EventKind {
    pub const CHECKOUT_SESSION_COMPLETED: &'static str = "checkout.session.completed";

    pub fn parse(kind: &str) -> Self {
        if kind == Self::CHECKOUT_SESSION_COMPLETED {
            EventKind::CheckoutSessionCompleted
        } else {
            EventKind::Other(kind.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::CheckoutSessionCompleted => Self::CHECKOUT_SESSION_COMPLETED,
            EventKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata threaded from checkout to settlement
///
/// Every value travels as a string because payment-session metadata is a flat
/// string map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub customer_id: Option<CustomerId>,
    pub referral_code: Option<String>,
    /// Only present when advisory validation accepted the code
    pub referrer_id: Option<CustomerId>,
    pub delivery_fee_pence: Option<u32>,
}

impl CheckoutMetadata {
    /// Flatten into the string map handed to the payment session
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Some(customer) = &self.customer_id {
            map.insert(META_CUSTOMER_ID.to_string(), customer.clone());
        }
        if let Some(code) = &self.referral_code {
            map.insert(META_REFERRAL_CODE.to_string(), code.clone());
        }
        if let Some(referrer) = &self.referrer_id {
            map.insert(META_REFERRER_ID.to_string(), referrer.clone());
        }
        if let Some(fee) = self.delivery_fee_pence {
            map.insert(META_DELIVERY_FEE_PENCE.to_string(), fee.to_string());
        }
        map
    }

    /// Read metadata back from a session's string map
    ///
    /// Blank values count as absent. An unparseable fee is dropped rather than
    /// failing the event, since the order must still be recorded.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| {
            map.get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        CheckoutMetadata {
            customer_id: get(META_CUSTOMER_ID),
            referral_code: get(META_REFERRAL_CODE),
            referrer_id: get(META_REFERRER_ID),
            delivery_fee_pence: get(META_DELIVERY_FEE_PENCE).and_then(|fee| fee.parse().ok()),
        }
    }
}

/// A verified payment-confirmation event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub id: EventId,
    pub kind: EventKind,
    /// Payment session the event refers to
    pub session_id: Option<String>,
    /// Total charged, in minor currency units
    pub amount_pence: i64,
    pub currency: String,
    pub metadata: CheckoutMetadata,
    pub items: Vec<OrderItem>,
}

impl PaymentEvent {
    pub fn is_checkout_completed(&self) -> bool {
        self.kind == EventKind::CheckoutSessionCompleted
    }
}
