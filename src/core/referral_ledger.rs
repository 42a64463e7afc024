//! Referral ledger
//!
//! Validates and redeems referral codes against the account store, and hands
//! out each customer's own code.
//!
//! # Validation vs redemption
//!
//! [`ReferralLedger::validate`] is advisory. It runs before payment, reads
//! current state and never writes, because the payment may never complete.
//! [`ReferralLedger::redeem`] is binding. It runs only after a payment is
//! confirmed and re-checks every rule inside the store's two-account commit,
//! so a code that was valid at checkout may legitimately be rejected here.
//!
//! Both paths use the same rules from [`evaluate_redemption`], applied in the
//! order: invalid code, self referral, code already used, already referred.

use crate::core::referral_code::{normalize_code, ReferralCodeGenerator};
use crate::core::traits::{AccountStore, StoreResult};
use crate::types::{
    evaluate_redemption, CodeAssignment, Redemption, RedemptionCheck, RedemptionCommit,
    ReferralRejection, ReferralValidation, SettlementError,
};
use std::sync::Arc;

/// Referral code validation, redemption and assignment
#[derive(Clone)]
pub struct ReferralLedger {
    accounts: Arc<dyn AccountStore>,
    generator: ReferralCodeGenerator,
    max_attempts: u32,
}

impl ReferralLedger {
    /// Create a ledger over an account store
    ///
    /// # Arguments
    ///
    /// * `accounts` - Account store shared with the other settlement components
    /// * `generator` - Source of candidate codes for [`ReferralLedger::ensure_code`]
    /// * `max_attempts` - How many colliding candidates to tolerate before giving up
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        generator: ReferralCodeGenerator,
        max_attempts: u32,
    ) -> Self {
        Self {
            accounts,
            generator,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Advisory check of whether `customer_id` could redeem `code` right now
    ///
    /// Rule failures are returned as a structured result, not as errors. Only
    /// storage failures produce `Err`. A customer without an account record is
    /// treated as never referred.
    pub async fn validate(&self, code: &str, customer_id: &str) -> StoreResult<ReferralValidation> {
        let Some(code) = normalize_code(code) else {
            return Ok(ReferralValidation::rejected(ReferralRejection::InvalidCode));
        };

        let Some(owner) = self.accounts.find_by_referral_code(&code).await? else {
            return Ok(ReferralValidation::rejected(ReferralRejection::InvalidCode));
        };

        let customer = if owner.customer == customer_id {
            None
        } else {
            self.accounts.get(customer_id).await?
        };

        let validation = match evaluate_redemption(&owner, customer_id, customer.as_ref()) {
            Ok(RedemptionCheck::Eligible) => ReferralValidation::accepted(owner.customer),
            Ok(RedemptionCheck::AlreadyApplied) => {
                ReferralValidation::rejected(ReferralRejection::CodeAlreadyUsed)
            }
            Err(reason) => ReferralValidation::rejected(reason),
        };

        tracing::debug!(
            code = %code,
            customer = %customer_id,
            valid = validation.valid,
            reason = ?validation.reason,
            "Validated referral code"
        );
        Ok(validation)
    }

    /// Bind `code` to `customer_id` after a confirmed payment
    ///
    /// # Arguments
    ///
    /// * `code` - Code cited at checkout
    /// * `customer_id` - The paying customer
    /// * `expected_referrer` - Referrer recorded at checkout, if any; a code now
    ///   owned by someone else is rejected as `INVALID_CODE`
    ///
    /// # Returns
    ///
    /// * `Ok(Redemption)` when the redemption was applied, or had already been
    ///   applied for exactly this pair
    /// * `Err(ReferralRejected)` when a rule fails; nothing is written
    /// * `Err(StorageUnavailable)` and friends for store failures
    pub async fn redeem(
        &self,
        code: &str,
        customer_id: &str,
        expected_referrer: Option<&str>,
    ) -> Result<Redemption, SettlementError> {
        let reject = |reason| SettlementError::referral_rejected(code, customer_id, reason);

        let code = normalize_code(code).ok_or_else(|| reject(ReferralRejection::InvalidCode))?;
        let owner = self
            .accounts
            .find_by_referral_code(&code)
            .await?
            .ok_or_else(|| reject(ReferralRejection::InvalidCode))?;

        if let Some(expected) = expected_referrer {
            if expected != owner.customer {
                tracing::warn!(
                    code = %code,
                    expected_referrer = %expected,
                    owner = %owner.customer,
                    "Referral code owner differs from checkout metadata"
                );
                return Err(reject(ReferralRejection::InvalidCode));
            }
        }

        let commit = self
            .accounts
            .commit_redemption(&code, &owner.customer, customer_id)
            .await?;

        let already_applied = match commit {
            RedemptionCommit::Applied { referrer_credits } => {
                tracing::info!(
                    code = %code,
                    referrer = %owner.customer,
                    customer = %customer_id,
                    referrer_credits,
                    "Referral redeemed"
                );
                false
            }
            RedemptionCommit::AlreadyApplied => {
                tracing::debug!(
                    code = %code,
                    referrer = %owner.customer,
                    customer = %customer_id,
                    "Referral redemption already applied"
                );
                true
            }
        };

        Ok(Redemption {
            code,
            referrer_id: owner.customer,
            already_applied,
        })
    }

    /// Return the customer's referral code, assigning one if absent
    ///
    /// Losing a race against a concurrent assignment returns the winner's
    /// code. Candidates owned by other accounts are redrawn.
    pub async fn ensure_code(&self, customer_id: &str) -> Result<String, SettlementError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.generator.generate();
            match self
                .accounts
                .assign_referral_code_if_absent(customer_id, &candidate)
                .await?
            {
                CodeAssignment::Assigned(code) => {
                    tracing::info!(customer = %customer_id, code = %code, "Assigned referral code");
                    return Ok(code);
                }
                CodeAssignment::AlreadyAssigned(code) => return Ok(code),
                CodeAssignment::CodeTaken => {
                    tracing::debug!(
                        customer = %customer_id,
                        candidate = %candidate,
                        attempt,
                        "Referral code collision"
                    );
                }
            }
        }

        Err(SettlementError::referral_code_exhausted(
            customer_id,
            self.max_attempts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::InMemoryAccountStore;
    use rstest::rstest;

    async fn ledger_with(customers: &[(&str, Option<&str>)]) -> (ReferralLedger, Arc<InMemoryAccountStore>) {
        let store = Arc::new(InMemoryAccountStore::new());
        for (customer, code) in customers {
            store.get_or_create(customer).await.unwrap();
            if let Some(code) = code {
                store
                    .assign_referral_code_if_absent(customer, code)
                    .await
                    .unwrap();
            }
        }
        let ledger = ReferralLedger::new(store.clone(), ReferralCodeGenerator::default(), 8);
        (ledger, store)
    }

    #[rstest]
    #[case::unknown_code("JC-NOPE0", "b", Some(ReferralRejection::InvalidCode))]
    #[case::blank_code("  ", "b", Some(ReferralRejection::InvalidCode))]
    #[case::self_referral("JC-AAAAA", "a", Some(ReferralRejection::SelfReferral))]
    #[case::valid("JC-AAAAA", "b", None)]
    #[case::lower_case_valid("jc-aaaaa", "b", None)]
    #[case::unknown_customer_valid("JC-AAAAA", "stranger", None)]
    #[tokio::test]
    async fn test_validate(
        #[case] code: &str,
        #[case] customer: &str,
        #[case] expected: Option<ReferralRejection>,
    ) {
        let (ledger, store) = ledger_with(&[("a", Some("JC-AAAAA")), ("b", None)]).await;
        let before = store.all().await.unwrap().len();

        let validation = ledger.validate(code, customer).await.unwrap();

        assert_eq!(validation.valid, expected.is_none());
        assert_eq!(validation.reason, expected);
        if validation.valid {
            assert_eq!(validation.referrer_id.as_deref(), Some("a"));
        }
        assert_eq!(store.all().await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn test_validate_reports_used_code_and_referred_customer() {
        let (ledger, _store) = ledger_with(&[
            ("a", Some("JC-AAAAA")),
            ("b", None),
            ("c", Some("JC-CCCCC")),
        ])
        .await;
        ledger.redeem("JC-AAAAA", "b", Some("a")).await.unwrap();

        let used = ledger.validate("JC-AAAAA", "c").await.unwrap();
        assert_eq!(used.reason, Some(ReferralRejection::CodeAlreadyUsed));

        let replay = ledger.validate("JC-AAAAA", "b").await.unwrap();
        assert_eq!(replay.reason, Some(ReferralRejection::CodeAlreadyUsed));

        let referred = ledger.validate("JC-CCCCC", "b").await.unwrap();
        assert_eq!(referred.reason, Some(ReferralRejection::AlreadyReferred));
    }

    #[tokio::test]
    async fn test_validate_never_writes() {
        let (ledger, store) = ledger_with(&[("a", Some("JC-AAAAA")), ("b", None)]).await;
        let before = store.all().await.unwrap();

        ledger.validate("JC-AAAAA", "b").await.unwrap();
        ledger.validate("JC-AAAAA", "a").await.unwrap();

        let mut after = store.all().await.unwrap();
        let mut before = before;
        before.sort_by(|x, y| x.customer.cmp(&y.customer));
        after.sort_by(|x, y| x.customer.cmp(&y.customer));
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_redeem_credits_referrer_only() {
        let (ledger, store) = ledger_with(&[("a", Some("JC-AAAAA")), ("b", None)]).await;

        let redemption = ledger.redeem("JC-AAAAA", "b", Some("a")).await.unwrap();
        assert_eq!(redemption.referrer_id, "a");
        assert!(!redemption.already_applied);

        let again = ledger.redeem("JC-AAAAA", "b", Some("a")).await.unwrap();
        assert!(again.already_applied);

        let a = store.get("a").await.unwrap().unwrap();
        let b = store.get("b").await.unwrap().unwrap();
        assert_eq!(a.free_delivery_credits, 1);
        assert_eq!(b.free_delivery_credits, 0);
        assert_eq!(b.referred_by.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_redeem_rejects_mismatched_referrer() {
        let (ledger, store) = ledger_with(&[("a", Some("JC-AAAAA")), ("b", None)]).await;

        let error = ledger.redeem("JC-AAAAA", "b", Some("z")).await.unwrap_err();
        assert_eq!(error.referral_rejection(), Some(ReferralRejection::InvalidCode));

        let a = store.get("a").await.unwrap().unwrap();
        assert!(!a.referral_code_redeemed);
    }

    #[rstest]
    #[case::unknown_code("JC-NOPE0", "b", ReferralRejection::InvalidCode)]
    #[case::self_referral("JC-AAAAA", "a", ReferralRejection::SelfReferral)]
    #[tokio::test]
    async fn test_redeem_rejections(
        #[case] code: &str,
        #[case] customer: &str,
        #[case] expected: ReferralRejection,
    ) {
        let (ledger, _store) = ledger_with(&[("a", Some("JC-AAAAA")), ("b", None)]).await;

        let error = ledger.redeem(code, customer, None).await.unwrap_err();
        assert_eq!(error.referral_rejection(), Some(expected));
    }

    #[tokio::test]
    async fn test_ensure_code_is_idempotent() {
        let (ledger, store) = ledger_with(&[("a", None)]).await;

        let first = ledger.ensure_code("a").await.unwrap();
        let second = ledger.ensure_code("a").await.unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("JC-"));
        let owner = store.find_by_referral_code(&first).await.unwrap().unwrap();
        assert_eq!(owner.customer, "a");
    }

    #[tokio::test]
    async fn test_ensure_code_unknown_customer() {
        let (ledger, _store) = ledger_with(&[]).await;
        let error = ledger.ensure_code("ghost").await.unwrap_err();
        assert_eq!(error.code(), "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_ensure_code_gives_up_when_space_is_full() {
        let store = Arc::new(InMemoryAccountStore::new());
        for (i, c) in "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ".chars().enumerate() {
            let owner = format!("owner-{i}");
            store.get_or_create(&owner).await.unwrap();
            store
                .assign_referral_code_if_absent(&owner, &format!("X-{c}"))
                .await
                .unwrap();
        }
        store.get_or_create("late").await.unwrap();
        let ledger = ReferralLedger::new(store, ReferralCodeGenerator::new("X", 1), 3);

        let error = ledger.ensure_code("late").await.unwrap_err();
        assert_eq!(
            error,
            SettlementError::referral_code_exhausted("late", 3)
        );
    }
}
