//! Account-related types for the settlement engine
//!
//! This module defines the per-customer Account record: the customer's own
//! referral code, whether that code has been redeemed and by whom, who referred
//! the customer, and the delivery credit counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Customer identifier
///
/// Opaque to the engine; registration hands out UUID v4 strings.
pub type CustomerId = String;

/// Customer account state
///
/// Invariants maintained by every store implementation:
/// - `referral_code` is unique across accounts and assigned at most once
/// - `referral_code_redeemed` is true exactly when `redeemed_by` is set
/// - `referred_by` is written at most once and never equals `customer`
/// - `free_delivery_credits` is unsigned and only changed with checked arithmetic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// The customer this account belongs to
    pub customer: CustomerId,

    /// Code this customer offers to others, assigned lazily
    pub referral_code: Option<String>,

    /// Whether another customer has redeemed `referral_code`
    pub referral_code_redeemed: bool,

    /// The customer who redeemed `referral_code`
    pub redeemed_by: Option<CustomerId>,

    /// Owner of the code this customer redeemed
    pub referred_by: Option<CustomerId>,

    /// Orders this customer may still receive with free delivery
    pub free_delivery_credits: u32,

    pub created_at: DateTime<Utc>,
    pub referral_created_at: Option<DateTime<Utc>>,
    pub referral_code_redeemed_at: Option<DateTime<Utc>>,
    pub referred_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account with no referral code and zero credits
    pub fn new(customer: CustomerId) -> Self {
        Account {
            customer,
            referral_code: None,
            referral_code_redeemed: false,
            redeemed_by: None,
            referred_by: None,
            free_delivery_credits: 0,
            created_at: Utc::now(),
            referral_created_at: None,
            referral_code_redeemed_at: None,
            referred_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_blank() {
        let account = Account::new("cust-1".to_string());

        assert_eq!(account.customer, "cust-1");
        assert!(account.referral_code.is_none());
        assert!(!account.referral_code_redeemed);
        assert!(account.redeemed_by.is_none());
        assert!(account.referred_by.is_none());
        assert_eq!(account.free_delivery_credits, 0);
    }

    #[test]
    fn test_account_schema_uses_camel_case() {
        let mut account = Account::new("cust-1".to_string());
        account.referral_code = Some("JC-AAAAA".to_string());
        account.free_delivery_credits = 2;

        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["referralCode"], "JC-AAAAA");
        assert_eq!(json["freeDeliveryCredits"], 2);
        assert_eq!(json["referralCodeRedeemed"], false);
    }
}
