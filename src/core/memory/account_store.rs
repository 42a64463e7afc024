//! Thread-safe in-memory account storage
//!
//! This module provides the `InMemoryAccountStore` struct, which keeps account
//! records in concurrent data structures so settlement can run for many
//! customers at once.
//!
//! # Design
//!
//! Accounts live in a `DashMap` of `Arc<Mutex<Account>>`. A record's `Arc` is
//! cloned out of the map before its mutex is taken, so no shard lock is held
//! while an account is being mutated. A second `DashMap` indexes referral codes
//! to their owners and doubles as the uniqueness guard for code assignment.
//!
//! # Locking
//!
//! - Single-account operations lock exactly one record.
//! - Redemption locks the referrer and the customer in ascending id order,
//!   so two redemptions over the same pair of accounts cannot deadlock.
//! - The code index and the credit-event index are only touched while at most
//!   one account lock is held, and never the other way round.

use crate::core::traits::{AccountStore, CreditConsumption, StoreResult};
use crate::types::{
    evaluate_redemption, Account, CodeAssignment, CustomerId, EventId, RedemptionCheck,
    RedemptionCommit, ReferralRejection, SettlementError,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

type AccountRecord = Arc<Mutex<Account>>;

/// Thread-safe account store backed by `DashMap`
///
/// Operations on different accounts never block each other; operations on
/// the same account are serialized by the record's mutex.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    /// Account records by customer id
    accounts: DashMap<CustomerId, AccountRecord>,

    /// Referral code to owning customer
    codes: DashMap<String, CustomerId>,

    /// Payment event to whether it consumed a credit
    credit_events: DashMap<EventId, bool>,
}

impl InMemoryAccountStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts held
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    fn record(&self, customer: &str) -> Option<AccountRecord> {
        self.accounts
            .get(customer)
            .map(|entry| Arc::clone(entry.value()))
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, customer: &str) -> StoreResult<Option<Account>> {
        Ok(self.record(customer).map(|record| record.lock().clone()))
    }

    async fn get_or_create(&self, customer: &str) -> StoreResult<(Account, bool)> {
        let mut created = false;
        let record = {
            let entry = self
                .accounts
                .entry(customer.to_string())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(Mutex::new(Account::new(customer.to_string())))
                });
            Arc::clone(entry.value())
        };

        let account = record.lock().clone();
        Ok((account, created))
    }

    async fn find_by_referral_code(&self, code: &str) -> StoreResult<Option<Account>> {
        let owner = match self.codes.get(code) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };

        Ok(self.record(&owner).map(|record| record.lock().clone()))
    }

    async fn assign_referral_code_if_absent(
        &self,
        customer: &str,
        code: &str,
    ) -> StoreResult<CodeAssignment> {
        let record = self
            .record(customer)
            .ok_or_else(|| SettlementError::user_not_found(customer))?;
        let mut account = record.lock();

        if let Some(existing) = &account.referral_code {
            return Ok(CodeAssignment::AlreadyAssigned(existing.clone()));
        }

        let mut claimed = false;
        self.codes.entry(code.to_string()).or_insert_with(|| {
            claimed = true;
            customer.to_string()
        });
        if !claimed {
            return Ok(CodeAssignment::CodeTaken);
        }

        account.referral_code = Some(code.to_string());
        account.referral_created_at = Some(Utc::now());
        Ok(CodeAssignment::Assigned(code.to_string()))
    }

    async fn increment_credits(&self, customer: &str, credits: u32) -> StoreResult<u32> {
        let record = self
            .record(customer)
            .ok_or_else(|| SettlementError::user_not_found(customer))?;
        let mut account = record.lock();

        let balance = account
            .free_delivery_credits
            .checked_add(credits)
            .ok_or_else(|| SettlementError::credit_overflow(customer))?;
        account.free_delivery_credits = balance;
        Ok(balance)
    }

    async fn decrement_credit_if_positive(&self, customer: &str) -> StoreResult<Option<u32>> {
        let Some(record) = self.record(customer) else {
            return Ok(None);
        };
        let mut account = record.lock();

        if account.free_delivery_credits == 0 {
            return Ok(None);
        }
        account.free_delivery_credits -= 1;
        Ok(Some(account.free_delivery_credits))
    }

    async fn consume_credit_for_event(
        &self,
        customer: &str,
        event_id: &str,
    ) -> StoreResult<CreditConsumption> {
        let Some(record) = self.record(customer) else {
            return Ok(CreditConsumption::NoCredit);
        };
        let mut account = record.lock();

        if let Some(consumed) = self.credit_events.get(event_id) {
            return Ok(CreditConsumption::Recorded {
                consumed: *consumed.value(),
            });
        }

        let outcome = match account.free_delivery_credits.checked_sub(1) {
            Some(balance) => {
                account.free_delivery_credits = balance;
                CreditConsumption::Consumed { balance }
            }
            None => CreditConsumption::NoCredit,
        };
        self.credit_events
            .insert(event_id.to_string(), outcome.consumed());
        Ok(outcome)
    }

    async fn commit_redemption(
        &self,
        code: &str,
        referrer: &str,
        customer: &str,
    ) -> StoreResult<RedemptionCommit> {
        let reject = |reason| SettlementError::referral_rejected(code, customer, reason);

        if referrer == customer {
            return Err(reject(ReferralRejection::SelfReferral));
        }

        let referrer_record = self
            .record(referrer)
            .ok_or_else(|| reject(ReferralRejection::InvalidCode))?;
        let customer_record = self
            .record(customer)
            .ok_or_else(|| reject(ReferralRejection::UserNotFound))?;

        let (mut referrer_account, mut customer_account) = if referrer < customer {
            let r = referrer_record.lock();
            let c = customer_record.lock();
            (r, c)
        } else {
            let c = customer_record.lock();
            let r = referrer_record.lock();
            (r, c)
        };

        if referrer_account.referral_code.as_deref() != Some(code) {
            return Err(reject(ReferralRejection::InvalidCode));
        }

        match evaluate_redemption(&referrer_account, customer, Some(&customer_account))
            .map_err(reject)?
        {
            RedemptionCheck::AlreadyApplied => Ok(RedemptionCommit::AlreadyApplied),
            RedemptionCheck::Eligible => {
                let referrer_credits = referrer_account
                    .free_delivery_credits
                    .checked_add(1)
                    .ok_or_else(|| SettlementError::credit_overflow(referrer))?;
                let now = Utc::now();

                referrer_account.referral_code_redeemed = true;
                referrer_account.redeemed_by = Some(customer.to_string());
                referrer_account.referral_code_redeemed_at = Some(now);
                referrer_account.free_delivery_credits = referrer_credits;

                customer_account.referred_by = Some(referrer.to_string());
                customer_account.referred_at = Some(now);

                Ok(RedemptionCommit::Applied { referrer_credits })
            }
        }
    }

    async fn all(&self) -> StoreResult<Vec<Account>> {
        let records: Vec<AccountRecord> = self
            .accounts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        Ok(records.iter().map(|record| record.lock().clone()).collect())
    }
}
