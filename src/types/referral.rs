//! Referral-related types
//!
//! Defines the rejection taxonomy for referral codes, the structured result of
//! advisory validation, and the outcomes of the conditional writes performed by
//! account stores. The redemption rules themselves live in
//! [`evaluate_redemption`] so that advisory validation and the binding
//! redemption apply exactly the same checks.

use super::account::{Account, CustomerId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a referral code cannot be redeemed by a customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralRejection {
    /// No account owns the code
    InvalidCode,
    /// The code belongs to the customer citing it
    SelfReferral,
    /// The code has already been redeemed by another customer
    CodeAlreadyUsed,
    /// The customer has already been referred once
    AlreadyReferred,
    /// The customer has no account record
    UserNotFound,
}

impl ReferralRejection {
    /// Stable taxonomy name
    pub fn code(&self) -> &'static str {
        match self {
            ReferralRejection::InvalidCode => "INVALID_CODE",
            ReferralRejection::SelfReferral => "SELF_REFERRAL",
            ReferralRejection::CodeAlreadyUsed => "CODE_ALREADY_USED",
            ReferralRejection::AlreadyReferred => "ALREADY_REFERRED",
            ReferralRejection::UserNotFound => "USER_NOT_FOUND",
        }
    }
}

impl fmt::Display for ReferralRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Advisory validation result returned to checkout callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReferralRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_id: Option<CustomerId>,
}

impl ReferralValidation {
    pub fn accepted(referrer_id: CustomerId) -> Self {
        Self {
            valid: true,
            reason: None,
            referrer_id: Some(referrer_id),
        }
    }

    pub fn rejected(reason: ReferralRejection) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            referrer_id: None,
        }
    }
}

/// State of a (referrer, customer) pair with respect to redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionCheck {
    /// All rules pass; the redemption may be applied
    Eligible,
    /// This exact redemption has already been applied
    AlreadyApplied,
}

/// Apply the redemption rules to the current state of both accounts
///
/// `referrer` must be the owner of the cited code. `customer` is `None` when
/// the redeeming customer has no account record yet, in which case they cannot
/// have been referred before.
///
/// Rule order: self referral, already applied (replay), code already used,
/// customer already referred.
pub fn evaluate_redemption(
    referrer: &Account,
    customer_id: &str,
    customer: Option<&Account>,
) -> Result<RedemptionCheck, ReferralRejection> {
    if referrer.customer == customer_id {
        return Err(ReferralRejection::SelfReferral);
    }

    let referred_by = customer.and_then(|c| c.referred_by.as_deref());

    if referrer.redeemed_by.as_deref() == Some(customer_id)
        && referred_by == Some(referrer.customer.as_str())
    {
        return Ok(RedemptionCheck::AlreadyApplied);
    }

    if referrer.referral_code_redeemed {
        return Err(ReferralRejection::CodeAlreadyUsed);
    }

    if referred_by.is_some() {
        return Err(ReferralRejection::AlreadyReferred);
    }

    Ok(RedemptionCheck::Eligible)
}

/// Outcome of a conditional referral-code write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeAssignment {
    /// The code was written
    Assigned(String),
    /// The account already had this code; nothing was written
    AlreadyAssigned(String),
    /// Another account owns the requested code; nothing was written
    CodeTaken,
}

/// Outcome of the atomic two-account redemption write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionCommit {
    /// The three writes were applied; carries the referrer's new credit balance
    Applied { referrer_credits: u32 },
    /// The writes had been applied by an earlier attempt
    AlreadyApplied,
}

/// A successful binding redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub code: String,
    pub referrer_id: CustomerId,
    pub already_applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str) -> Account {
        Account::new(id.to_string())
    }

    #[test]
    fn test_fresh_pair_is_eligible() {
        let referrer = account("a");
        let customer = account("b");

        assert_eq!(
            evaluate_redemption(&referrer, "b", Some(&customer)),
            Ok(RedemptionCheck::Eligible)
        );
        assert_eq!(
            evaluate_redemption(&referrer, "b", None),
            Ok(RedemptionCheck::Eligible)
        );
    }

    #[test]
    fn test_self_referral_rejected_first() {
        let mut referrer = account("a");
        referrer.referral_code_redeemed = true;
        referrer.redeemed_by = Some("z".to_string());

        assert_eq!(
            evaluate_redemption(&referrer, "a", Some(&referrer.clone())),
            Err(ReferralRejection::SelfReferral)
        );
    }

    #[test]
    fn test_redeemed_code_rejected_for_other_customer() {
        let mut referrer = account("a");
        referrer.referral_code_redeemed = true;
        referrer.redeemed_by = Some("b".to_string());

        assert_eq!(
            evaluate_redemption(&referrer, "c", Some(&account("c"))),
            Err(ReferralRejection::CodeAlreadyUsed)
        );
    }

    #[test]
    fn test_already_referred_customer_rejected() {
        let referrer = account("a");
        let mut customer = account("b");
        customer.referred_by = Some("x".to_string());

        assert_eq!(
            evaluate_redemption(&referrer, "b", Some(&customer)),
            Err(ReferralRejection::AlreadyReferred)
        );
    }

    #[test]
    fn test_applied_pair_is_recognised() {
        let mut referrer = account("a");
        referrer.referral_code_redeemed = true;
        referrer.redeemed_by = Some("b".to_string());
        let mut customer = account("b");
        customer.referred_by = Some("a".to_string());

        assert_eq!(
            evaluate_redemption(&referrer, "b", Some(&customer)),
            Ok(RedemptionCheck::AlreadyApplied)
        );
    }

    #[test]
    fn test_validation_serializes_reason_in_taxonomy_form() {
        let json = serde_json::to_string(&ReferralValidation::rejected(
            ReferralRejection::SelfReferral,
        ))
        .unwrap();
        assert_eq!(json, r#"{"valid":false,"reason":"SELF_REFERRAL"}"#);

        let json = serde_json::to_string(&ReferralValidation::accepted("a".to_string())).unwrap();
        assert_eq!(json, r#"{"valid":true,"referrerId":"a"}"#);
    }
}
