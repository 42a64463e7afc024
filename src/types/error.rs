//! Error types for the settlement engine
//!
//! This module defines all error types that can occur while quoting checkouts,
//! verifying payment webhooks, and settling confirmed payments.
//!
//! # Error Categories
//!
//! - **Referral Errors**: Invalid, self-owned, already redeemed codes, or customers already referred
//! - **Account Errors**: Unknown customers, credit counter overflow, code assignment failures
//! - **Webhook Errors**: Signature failures and malformed event payloads
//! - **Storage Errors**: Backing store unavailable (retryable)
//! - **Replay I/O Errors**: File not found, CSV parsing, write failures

use crate::types::referral::ReferralRejection;
use thiserror::Error;

/// Main error type for the settlement engine
///
/// Each variant carries enough context to log it meaningfully. The stable
/// taxonomy name of a variant is available through [`SettlementError::code`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    /// A referral code failed one of the redemption rules
    ///
    /// Recoverable: pre-payment it becomes a structured validation result,
    /// at settlement the referral effects are skipped and the order proceeds.
    #[error("Referral code '{code}' rejected for customer {customer}: {reason}")]
    ReferralRejected {
        /// The code that was cited
        code: String,
        /// The customer who cited it
        customer: String,
        /// Which rule failed
        reason: ReferralRejection,
    },

    /// No account exists for the customer
    #[error("Customer {customer} not found")]
    UserNotFound {
        /// The unknown customer id
        customer: String,
    },

    /// Webhook signature verification failed
    ///
    /// Fatal for the delivery: the event is rejected without any state change
    /// and must not be retried with the same payload.
    #[error("Webhook signature invalid: {reason}")]
    SignatureInvalid {
        /// Why verification failed
        reason: String,
    },

    /// A verified webhook payload could not be interpreted
    #[error("Malformed payment event: {message}")]
    MalformedEvent {
        /// Description of the problem
        message: String,
    },

    /// The backing store could not complete an operation
    ///
    /// Retryable: the event is released so that redelivery resumes settlement.
    #[error("Storage unavailable during {operation}: {message}")]
    StorageUnavailable {
        /// Operation that failed
        operation: String,
        /// Driver-level description
        message: String,
    },

    /// Incrementing a credit counter would overflow
    #[error("Delivery credit overflow for customer {customer}")]
    CreditOverflow {
        /// Customer whose counter is saturated
        customer: String,
    },

    /// Every generated referral code collided with an existing one
    #[error("Could not assign a unique referral code to customer {customer} after {attempts} attempts")]
    ReferralCodeExhausted {
        /// Customer awaiting a code
        customer: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// An explicitly supplied referral code is owned by another account
    #[error("Referral code '{code}' is already assigned to another customer")]
    ReferralCodeTaken {
        /// The conflicting code
        code: String,
    },

    /// Replay input file not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// I/O error while reading or writing replay files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// Replay log row could not be parsed
    ///
    /// Recoverable: the row is skipped and replay continues.
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for SettlementError {
    fn from(error: std::io::Error) -> Self {
        SettlementError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for SettlementError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        SettlementError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<csv_async::Error> for SettlementError {
    fn from(error: csv_async::Error) -> Self {
        SettlementError::ParseError {
            line: None,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(error: serde_json::Error) -> Self {
        SettlementError::MalformedEvent {
            message: error.to_string(),
        }
    }
}

impl SettlementError {
    /// Create a ReferralRejected error
    pub fn referral_rejected(code: &str, customer: &str, reason: ReferralRejection) -> Self {
        SettlementError::ReferralRejected {
            code: code.to_string(),
            customer: customer.to_string(),
            reason,
        }
    }

    /// Create a UserNotFound error
    pub fn user_not_found(customer: &str) -> Self {
        SettlementError::UserNotFound {
            customer: customer.to_string(),
        }
    }

    /// Create a SignatureInvalid error
    pub fn signature_invalid(reason: &str) -> Self {
        SettlementError::SignatureInvalid {
            reason: reason.to_string(),
        }
    }

    /// Create a MalformedEvent error
    pub fn malformed_event(message: impl Into<String>) -> Self {
        SettlementError::MalformedEvent {
            message: message.into(),
        }
    }

    /// Create a StorageUnavailable error
    pub fn storage_unavailable(operation: &str, message: impl Into<String>) -> Self {
        SettlementError::StorageUnavailable {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create a CreditOverflow error
    pub fn credit_overflow(customer: &str) -> Self {
        SettlementError::CreditOverflow {
            customer: customer.to_string(),
        }
    }

    /// Create a ReferralCodeExhausted error
    pub fn referral_code_exhausted(customer: &str, attempts: u32) -> Self {
        SettlementError::ReferralCodeExhausted {
            customer: customer.to_string(),
            attempts,
        }
    }

    /// Create a ReferralCodeTaken error
    pub fn referral_code_taken(code: &str) -> Self {
        SettlementError::ReferralCodeTaken {
            code: code.to_string(),
        }
    }

    /// Create a ParseError without line information
    pub fn parse_error(message: impl Into<String>) -> Self {
        SettlementError::ParseError {
            line: None,
            message: message.into(),
        }
    }

    /// Stable taxonomy name, as exposed to callers and logs
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::ReferralRejected { reason, .. } => reason.code(),
            SettlementError::UserNotFound { .. } => "USER_NOT_FOUND",
            SettlementError::SignatureInvalid { .. } => "SIGNATURE_INVALID",
            SettlementError::MalformedEvent { .. } => "MALFORMED_EVENT",
            SettlementError::StorageUnavailable { .. } => "STORAGE_UNAVAILABLE",
            SettlementError::CreditOverflow { .. } => "CREDIT_OVERFLOW",
            SettlementError::ReferralCodeExhausted { .. } => "REFERRAL_CODE_EXHAUSTED",
            SettlementError::ReferralCodeTaken { .. } => "REFERRAL_CODE_TAKEN",
            SettlementError::FileNotFound { .. } => "FILE_NOT_FOUND",
            SettlementError::IoError { .. } => "IO_ERROR",
            SettlementError::ParseError { .. } => "PARSE_ERROR",
        }
    }

    /// The referral rule that failed, if this is a referral rejection
    pub fn referral_rejection(&self) -> Option<ReferralRejection> {
        match self {
            SettlementError::ReferralRejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether the delivering party should retry the same event later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::StorageUnavailable { .. } | SettlementError::ReferralCodeExhausted { .. }
        )
    }
}
