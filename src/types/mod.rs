//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Customer account records
//! - `order`: Persisted order records
//! - `event`: Payment-confirmation events and checkout metadata
//! - `referral`: Referral rules, validation results and store outcomes
//! - `settlement`: Settlement progress, reports and outcomes
//! - `operation`: Replay log operations
//! - `error`: Error types for the settlement engine

pub mod account;
pub mod error;
pub mod event;
pub mod operation;
pub mod order;
pub mod referral;
pub mod settlement;

pub use account::{Account, CustomerId};
pub use error::SettlementError;
pub use event::{CheckoutMetadata, EventId, EventKind, PaymentEvent};
pub use operation::{Operation, OperationType};
pub use order::{Order, OrderId, OrderItem, PaymentStatus};
pub use referral::{
    evaluate_redemption, CodeAssignment, Redemption, RedemptionCheck, RedemptionCommit,
    ReferralRejection, ReferralValidation,
};
pub use settlement::{
    ReferralSettlement, SettlementOutcome, SettlementProgress, SettlementReport,
};
