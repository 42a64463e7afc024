//! Replay operation types
//!
//! The replay CLI drives the settlement components from an operation log. Each
//! row of the log becomes one [`Operation`].

use super::account::CustomerId;
use super::event::EventId;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Operation types accepted in a replay log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Create an account, optionally with an imported referral code
    Register,

    /// Grant delivery credits to an account
    Grant,

    /// Quote a checkout and open a payment session
    Checkout,

    /// Deliver a signed payment-confirmation event
    Payment,
}

/// A single parsed replay operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Register {
        customer: CustomerId,
        referral_code: Option<String>,
    },
    Grant {
        customer: CustomerId,
        credits: NonZeroU32,
    },
    Checkout {
        customer: CustomerId,
        referral_code: Option<String>,
        delivery_fee_pence: u32,
    },
    Payment {
        customer: CustomerId,
        event_id: EventId,
        amount_pence: i64,
    },
}

impl Operation {
    /// The customer the operation acts on
    pub fn customer(&self) -> &str {
        match self {
            Operation::Register { customer, .. }
            | Operation::Grant { customer, .. }
            | Operation::Checkout { customer, .. }
            | Operation::Payment { customer, .. } => customer,
        }
    }

    pub fn operation_type(&self) -> OperationType {
        match self {
            Operation::Register { .. } => OperationType::Register,
            Operation::Grant { .. } => OperationType::Grant,
            Operation::Checkout { .. } => OperationType::Checkout,
            Operation::Payment { .. } => OperationType::Payment,
        }
    }
}
