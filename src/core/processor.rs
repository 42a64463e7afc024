//! Payment event processor
//!
//! The settlement state machine. Each confirmed payment event is settled
//! exactly once, even when the payment collaborator delivers it several
//! times or concurrently.
//!
//! # Flow
//!
//! ```text
//! handle_webhook(payload, header)
//!     ├── verify signature            SIGNATURE_INVALID, no state touched
//!     ├── parse envelope              MALFORMED_EVENT, no state touched
//!     └── process(event)
//!          ├── ignore other event types and events without a customer
//!          ├── claim event id          processed or in flight -> Duplicate
//!          ├── settle
//!          │    ├── ensure payer account
//!          │    ├── Step 2: materialize order (idempotent by event id)
//!          │    ├── Step 3: redeem cited referral, skip on rule failure
//!          │    │           then ensure payer's own referral code
//!          │    └── Step 4: consume one delivery credit if available
//!          └── complete on success, release on failure
//! ```
//!
//! # Recovery
//!
//! The event is marked processed only after every step succeeded. Each step
//! records its result on the event record as it completes, so when a failed
//! attempt is released and the event redelivered, settlement resumes at the
//! first incomplete step. Every step is also idempotent on its own (order
//! insert keyed by event id, redemption replay recognised by the store, credit
//! consumption recorded per event id), so an attempt that dies between a
//! mutation and its progress record, or a claim taken over after its lease
//! expired, never applies a side effect twice.

use crate::core::credit_account::CreditAccount;
use crate::core::referral_ledger::ReferralLedger;
use crate::core::traits::{
    AccountStore, EventClaim, OrderInsert, OrderStore, ProcessedEventStore,
};
use crate::types::{
    Order, PaymentEvent, PaymentStatus, ReferralSettlement, SettlementError, SettlementOutcome,
    SettlementProgress, SettlementReport,
};
use crate::webhook::{parse_event, WebhookVerifier};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Settles confirmed payment events
#[derive(Clone)]
pub struct PaymentEventProcessor {
    accounts: Arc<dyn AccountStore>,
    orders: Arc<dyn OrderStore>,
    events: Arc<dyn ProcessedEventStore>,
    ledger: ReferralLedger,
    credits: CreditAccount,
    verifier: WebhookVerifier,
}

impl PaymentEventProcessor {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        orders: Arc<dyn OrderStore>,
        events: Arc<dyn ProcessedEventStore>,
        ledger: ReferralLedger,
        credits: CreditAccount,
        verifier: WebhookVerifier,
    ) -> Self {
        Self {
            accounts,
            orders,
            events,
            ledger,
            credits,
            verifier,
        }
    }

    /// Authenticate, parse and settle one webhook delivery
    ///
    /// # Arguments
    ///
    /// * `payload` - The raw request body, exactly as received
    /// * `signature_header` - The collaborator's signature header
    ///
    /// # Returns
    ///
    /// * `Ok(outcome)` - acknowledge the delivery
    /// * `Err(e)` - reject it; redelivery is useful only when
    ///   [`SettlementError::is_retryable`] holds
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        if let Err(error) = self.verifier.verify(payload, signature_header) {
            tracing::warn!(error = %error, "Rejected webhook delivery");
            return Err(error);
        }

        let event = parse_event(payload).inspect_err(|error| {
            tracing::warn!(error = %error, "Rejected malformed webhook payload");
        })?;

        self.process(event).await
    }

    /// Settle a verified payment event
    pub async fn process(&self, event: PaymentEvent) -> Result<SettlementOutcome, SettlementError> {
        if !event.is_checkout_completed() {
            tracing::debug!(event_id = %event.id, kind = %event.kind, "Ignoring event type");
            return Ok(SettlementOutcome::Ignored {
                reason: format!("event type {} needs no settlement", event.kind),
                event_id: event.id,
            });
        }

        let Some(customer) = event.metadata.customer_id.clone() else {
            tracing::error!(event_id = %event.id, "Completed checkout without customerId metadata");
            return Ok(SettlementOutcome::Ignored {
                reason: "missing customerId metadata".to_string(),
                event_id: event.id,
            });
        };

        let progress = match self.events.claim(&event.id).await? {
            EventClaim::Acquired(progress) => progress,
            EventClaim::InFlight | EventClaim::Processed(_) => {
                tracing::info!(event_id = %event.id, customer = %customer, "Duplicate payment event");
                return Ok(SettlementOutcome::Duplicate { event_id: event.id });
            }
        };

        let result = match self.settle(&event, &customer, progress).await {
            Ok(report) => self.events.complete(&event.id, &report).await.map(|_| report),
            Err(error) => Err(error),
        };

        match result {
            Ok(report) => {
                tracing::info!(
                    event_id = %event.id,
                    customer = %customer,
                    order_id = %report.order_id,
                    referral_redeemed = report.referral.is_redeemed(),
                    delivery_credit_consumed = report.delivery_credit_consumed,
                    "Settled payment event"
                );
                Ok(SettlementOutcome::Settled(report))
            }
            Err(error) => {
                if let Err(release_error) = self.events.release(&event.id).await {
                    tracing::error!(
                        event_id = %event.id,
                        error = %release_error,
                        "Failed to release payment event"
                    );
                }
                tracing::warn!(
                    event_id = %event.id,
                    customer = %customer,
                    error = %error,
                    retryable = error.is_retryable(),
                    "Settlement failed"
                );
                Err(error)
            }
        }
    }

    async fn settle(
        &self,
        event: &PaymentEvent,
        customer: &str,
        mut progress: SettlementProgress,
    ) -> Result<SettlementReport, SettlementError> {
        let (_, created) = self.accounts.get_or_create(customer).await?;
        if created {
            tracing::info!(customer = %customer, "Created account for paying customer");
        }

        let order_id = match progress.order_id {
            Some(order_id) => order_id,
            None => {
                let order_id = self.materialize_order(event, customer).await?;
                progress.order_id = Some(order_id);
                self.events.record_progress(&event.id, &progress).await?;
                order_id
            }
        };

        let referral = match progress.referral.clone() {
            Some(referral) => referral,
            None => {
                let referral = self.settle_referral(event, customer).await?;
                progress.referral = Some(referral.clone());
                self.events.record_progress(&event.id, &progress).await?;
                referral
            }
        };

        if !progress.payer_code_ensured {
            self.ledger.ensure_code(customer).await?;
            progress.payer_code_ensured = true;
            self.events.record_progress(&event.id, &progress).await?;
        }

        let delivery_credit_consumed = match progress.credit_applied {
            Some(consumed) => consumed,
            None => {
                let consumed = self.credits.consume_for_event(customer, &event.id).await?;
                progress.credit_applied = Some(consumed);
                self.events.record_progress(&event.id, &progress).await?;
                consumed
            }
        };

        Ok(SettlementReport {
            event_id: event.id.clone(),
            customer: customer.to_string(),
            order_id,
            referral,
            delivery_credit_consumed,
        })
    }

    async fn materialize_order(
        &self,
        event: &PaymentEvent,
        customer: &str,
    ) -> Result<Uuid, SettlementError> {
        let order = Order {
            id: Uuid::new_v4(),
            customer: customer.to_string(),
            items: event.items.clone(),
            amount_pence: event.amount_pence,
            currency: event.currency.clone(),
            delivery_fee_pence: event.metadata.delivery_fee_pence.unwrap_or(0),
            payment_status: PaymentStatus::Paid,
            referral_code_used: event.metadata.referral_code.clone(),
            referrer: event.metadata.referrer_id.clone(),
            created_at: Utc::now(),
            source_event: event.id.clone(),
            payment_session: event.session_id.clone(),
        };

        match self.orders.insert_if_absent(order).await? {
            OrderInsert::Created(order) => {
                tracing::info!(event_id = %event.id, order_id = %order.id, customer = %customer, "Created order");
                Ok(order.id)
            }
            OrderInsert::Existing(order) => {
                tracing::debug!(event_id = %event.id, order_id = %order.id, "Order already exists");
                Ok(order.id)
            }
        }
    }

    async fn settle_referral(
        &self,
        event: &PaymentEvent,
        customer: &str,
    ) -> Result<ReferralSettlement, SettlementError> {
        let Some(code) = event.metadata.referral_code.as_deref() else {
            return Ok(ReferralSettlement::NotRequested);
        };

        match self
            .ledger
            .redeem(code, customer, event.metadata.referrer_id.as_deref())
            .await
        {
            Ok(redemption) if redemption.already_applied => Ok(ReferralSettlement::AlreadyApplied {
                code: redemption.code,
                referrer: redemption.referrer_id,
            }),
            Ok(redemption) => Ok(ReferralSettlement::Redeemed {
                code: redemption.code,
                referrer: redemption.referrer_id,
            }),
            Err(error) => match error.referral_rejection() {
                Some(reason) => {
                    tracing::warn!(
                        event_id = %event.id,
                        customer = %customer,
                        code = %code,
                        reason = %reason,
                        "Referral not applied at settlement"
                    );
                    Ok(ReferralSettlement::Skipped {
                        code: code.to_string(),
                        reason,
                    })
                }
                None => Err(error),
            },
        }
    }
}
