//! Settlement configuration
//!
//! Values that shape settlement behaviour but are not per-request: referral
//! code format, collision retries, webhook verification parameters and the
//! event claim lease. The CLI builds this from flags and environment
//! variables.

use crate::core::referral_code::ReferralCodeGenerator;
use crate::webhook::{WebhookVerifier, DEFAULT_TOLERANCE_SECS};

pub const DEFAULT_REFERRAL_CODE_PREFIX: &str = "JC";
pub const DEFAULT_REFERRAL_CODE_LENGTH: usize = 5;
pub const DEFAULT_REFERRAL_CODE_ATTEMPTS: u32 = 8;
pub const DEFAULT_WEBHOOK_SECRET: &str = "whsec_replay_local";
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementConfig {
    pub referral_code_prefix: String,
    /// Characters after the prefix and dash
    pub referral_code_length: usize,
    /// Candidate codes to try before giving up on a collision streak
    pub referral_code_attempts: u32,
    pub webhook_secret: String,
    pub signature_tolerance_secs: i64,
    /// Age after which an in-flight event claim may be taken over
    pub claim_lease_secs: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            referral_code_prefix: DEFAULT_REFERRAL_CODE_PREFIX.to_string(),
            referral_code_length: DEFAULT_REFERRAL_CODE_LENGTH,
            referral_code_attempts: DEFAULT_REFERRAL_CODE_ATTEMPTS,
            webhook_secret: DEFAULT_WEBHOOK_SECRET.to_string(),
            signature_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS,
        }
    }
}

impl SettlementConfig {
    /// Replace invalid values with defaults, warning about each one
    pub fn validated(mut self) -> Self {
        let default = Self::default();

        if self.referral_code_prefix.trim().is_empty() {
            tracing::warn!(
                default = %default.referral_code_prefix,
                "Empty referral code prefix, using default"
            );
            self.referral_code_prefix = default.referral_code_prefix;
        }
        if self.referral_code_length == 0 {
            tracing::warn!(
                default = default.referral_code_length,
                "Invalid referral code length (0), using default"
            );
            self.referral_code_length = default.referral_code_length;
        }
        if self.referral_code_attempts == 0 {
            tracing::warn!(
                default = default.referral_code_attempts,
                "Invalid referral code attempts (0), using default"
            );
            self.referral_code_attempts = default.referral_code_attempts;
        }
        if self.webhook_secret.is_empty() {
            tracing::warn!("Empty webhook secret, using the local replay secret");
            self.webhook_secret = default.webhook_secret;
        }
        if self.signature_tolerance_secs <= 0 {
            tracing::warn!(
                value = self.signature_tolerance_secs,
                default = default.signature_tolerance_secs,
                "Invalid signature tolerance, using default"
            );
            self.signature_tolerance_secs = default.signature_tolerance_secs;
        }
        if self.claim_lease_secs <= 0 {
            tracing::warn!(
                value = self.claim_lease_secs,
                default = default.claim_lease_secs,
                "Invalid claim lease, using default"
            );
            self.claim_lease_secs = default.claim_lease_secs;
        }

        self
    }

    pub fn code_generator(&self) -> ReferralCodeGenerator {
        ReferralCodeGenerator::new(
            self.referral_code_prefix.trim().to_ascii_uppercase(),
            self.referral_code_length,
        )
    }

    pub fn verifier(&self) -> WebhookVerifier {
        WebhookVerifier::new(self.webhook_secret.clone(), self.signature_tolerance_secs)
    }
}
