//! Payment webhook handling
//!
//! - `signature`: HMAC-SHA256 verification and signing of delivery headers
//! - `payload`: envelope parsing into [`crate::types::PaymentEvent`]

pub mod payload;
pub mod signature;

pub use payload::{encode_event, parse_event};
pub use signature::{WebhookVerifier, DEFAULT_TOLERANCE_SECS};
