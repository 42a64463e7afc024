//! Checkout intent builder
//!
//! The pre-payment step. It makes sure the customer has a code of their own to
//! share, gives advisory feedback on any code they cited, and quotes the
//! delivery fee. Nothing here is binding: the cited code is only redeemed and
//! the credit only consumed once the payment is confirmed.
//!
//! The only write performed is the lazy assignment of the customer's own
//! referral code, which is a conditional set of an absent field.

use crate::core::credit_account::CreditAccount;
use crate::core::referral_code::normalize_code;
use crate::core::referral_ledger::ReferralLedger;
use crate::core::traits::{AccountStore, PaymentSession, PaymentSessionGateway, PaymentSessionRequest};
use crate::types::{CheckoutMetadata, CustomerId, OrderItem, ReferralValidation, SettlementError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Checkout request as received from the storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub referral_code: Option<String>,
    /// Fee from the delivery banding collaborator, before credits
    pub delivery_fee_pence: u32,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Quote returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutIntent {
    pub customer_id: CustomerId,
    /// The customer's own code to share with others
    pub customer_referral_code: String,
    pub quoted_delivery_fee_pence: u32,
    /// Whether the quote relies on a delivery credit
    pub free_delivery_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_validation: Option<ReferralValidation>,
    #[serde(skip)]
    pub metadata: CheckoutMetadata,
}

/// A quote together with the payment session opened for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedCheckout {
    pub intent: CheckoutIntent,
    pub session: PaymentSession,
}

#[derive(Clone)]
pub struct CheckoutIntentBuilder {
    accounts: Arc<dyn AccountStore>,
    ledger: ReferralLedger,
    credits: CreditAccount,
}

impl CheckoutIntentBuilder {
    pub fn new(accounts: Arc<dyn AccountStore>, ledger: ReferralLedger, credits: CreditAccount) -> Self {
        Self {
            accounts,
            ledger,
            credits,
        }
    }

    /// Quote a checkout
    ///
    /// # Steps
    ///
    /// 1. Ensure the customer has a referral code (conditional write)
    /// 2. Validate the cited code, if any, without mutating state
    /// 3. Quote a zero fee when the customer holds a delivery credit
    ///
    /// The cited code and, when validation accepted it, the referrer id are
    /// placed in the metadata for the payment session.
    ///
    /// # Errors
    ///
    /// `USER_NOT_FOUND` for an unknown customer, plus any store failure.
    pub async fn build(&self, request: &CheckoutRequest) -> Result<CheckoutIntent, SettlementError> {
        let customer_id = request.customer_id.as_str();
        if self.accounts.get(customer_id).await?.is_none() {
            return Err(SettlementError::user_not_found(customer_id));
        }

        let customer_referral_code = self.ledger.ensure_code(customer_id).await?;

        let cited_code = request.referral_code.as_deref().and_then(normalize_code);
        let referral_validation = match &cited_code {
            Some(code) => Some(self.ledger.validate(code, customer_id).await?),
            None => None,
        };

        let free_delivery_applied = self.credits.available(customer_id).await? > 0;
        let quoted_delivery_fee_pence = if free_delivery_applied {
            0
        } else {
            request.delivery_fee_pence
        };

        let metadata = CheckoutMetadata {
            customer_id: Some(request.customer_id.clone()),
            referral_code: cited_code,
            referrer_id: referral_validation
                .as_ref()
                .and_then(|validation| validation.referrer_id.clone()),
            delivery_fee_pence: Some(quoted_delivery_fee_pence),
        };

        tracing::debug!(
            customer = %customer_id,
            quoted_delivery_fee_pence,
            free_delivery_applied,
            referral_valid = ?referral_validation.as_ref().map(|v| v.valid),
            "Built checkout intent"
        );

        Ok(CheckoutIntent {
            customer_id: request.customer_id.clone(),
            customer_referral_code,
            quoted_delivery_fee_pence,
            free_delivery_applied,
            referral_validation,
            metadata,
        })
    }

    /// Quote a checkout and open a payment session for it
    pub async fn begin(
        &self,
        request: &CheckoutRequest,
        gateway: &dyn PaymentSessionGateway,
    ) -> Result<StartedCheckout, SettlementError> {
        let intent = self.build(request).await?;

        let session = gateway
            .create_session(PaymentSessionRequest {
                customer_id: intent.customer_id.clone(),
                items: request.items.clone(),
                delivery_fee_pence: intent.quoted_delivery_fee_pence,
                metadata: intent.metadata.to_map(),
            })
            .await?;

        tracing::info!(
            customer = %intent.customer_id,
            session = %session.id,
            quoted_delivery_fee_pence = intent.quoted_delivery_fee_pence,
            "Opened payment session"
        );

        Ok(StartedCheckout { intent, session })
    }
}
