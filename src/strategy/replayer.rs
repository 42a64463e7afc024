//! Operation replay
//!
//! Drives the settlement components from replay operations the way the live
//! system is driven by its callers. Checkouts open sessions on a local
//! gateway; payments are turned into signed confirmation events and delivered
//! through the webhook entry point, so replays exercise verification,
//! envelope parsing and deduplication end to end.

use crate::config::SettlementConfig;
use crate::core::traits::{PaymentSession, PaymentSessionGateway, PaymentSessionRequest, StoreResult};
use crate::core::{CheckoutRequest, SettlementServices};
use crate::types::{
    CheckoutMetadata, CustomerId, EventKind, Operation, PaymentEvent, SettlementError,
    SettlementOutcome,
};
use crate::webhook::{encode_event, WebhookVerifier};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const REPLAY_CURRENCY: &str = "gbp";

/// Payment-session gateway that keeps the latest session per customer
#[derive(Debug, Default)]
pub struct ReplaySessions {
    sessions: DashMap<CustomerId, (PaymentSession, PaymentSessionRequest)>,
    next_id: AtomicU64,
}

impl ReplaySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent session opened for `customer`
    pub fn latest(&self, customer: &str) -> Option<(PaymentSession, PaymentSessionRequest)> {
        self.sessions.get(customer).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PaymentSessionGateway for ReplaySessions {
    async fn create_session(&self, request: PaymentSessionRequest) -> StoreResult<PaymentSession> {
        let sequence = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = PaymentSession {
            id: format!("cs_replay_{:06}", sequence),
            url: None,
        };
        self.sessions
            .insert(request.customer_id.clone(), (session.clone(), request));
        Ok(session)
    }
}

/// Applies replay operations to one set of settlement components
#[derive(Clone)]
pub struct Replayer {
    services: SettlementServices,
    sessions: Arc<ReplaySessions>,
    signer: WebhookVerifier,
}

impl Replayer {
    pub fn new(config: &SettlementConfig) -> Self {
        Self::with_services(config, SettlementServices::in_memory(config))
    }

    pub fn with_services(config: &SettlementConfig, services: SettlementServices) -> Self {
        Self {
            services,
            sessions: Arc::new(ReplaySessions::new()),
            signer: config.verifier(),
        }
    }

    pub fn services(&self) -> &SettlementServices {
        &self.services
    }

    /// Apply a single operation
    ///
    /// # Errors
    ///
    /// Whatever the underlying component returns. Referral rejections at
    /// checkout are not errors: they are part of the quote and only logged.
    pub async fn apply(&self, operation: Operation) -> Result<(), SettlementError> {
        match operation {
            Operation::Register {
                customer,
                referral_code,
            } => {
                self.services
                    .customers
                    .register_with_id(&customer, referral_code.as_deref())
                    .await?;
            }
            Operation::Grant { customer, credits } => {
                self.services.credits.grant(&customer, credits).await?;
            }
            Operation::Checkout {
                customer,
                referral_code,
                delivery_fee_pence,
            } => {
                let request = CheckoutRequest {
                    customer_id: customer,
                    referral_code,
                    delivery_fee_pence,
                    items: Vec::new(),
                };
                let started = self
                    .services
                    .checkout
                    .begin(&request, self.sessions.as_ref())
                    .await?;
                if let Some(validation) = started
                    .intent
                    .referral_validation
                    .as_ref()
                    .filter(|validation| !validation.valid)
                {
                    tracing::info!(
                        customer = %started.intent.customer_id,
                        reason = ?validation.reason,
                        "Checkout cites a referral code that would not be redeemed"
                    );
                }
            }
            Operation::Payment {
                customer,
                event_id,
                amount_pence,
            } => {
                let outcome = self.deliver_payment(customer, event_id, amount_pence).await?;
                tracing::info!(event_id = %outcome.event_id(), outcome = outcome.code(), "Delivered payment event");
            }
        }

        Ok(())
    }

    /// Build, sign and deliver the confirmation for a customer's latest session
    ///
    /// Without a prior checkout the event carries only the customer id, which
    /// settles an order with no referral and no delivery fee.
    async fn deliver_payment(
        &self,
        customer: CustomerId,
        event_id: String,
        amount_pence: i64,
    ) -> Result<SettlementOutcome, SettlementError> {
        let (session_id, metadata, items) = match self.sessions.latest(&customer) {
            Some((session, request)) => (
                Some(session.id),
                CheckoutMetadata::from_map(&request.metadata),
                request.items,
            ),
            None => (
                None,
                CheckoutMetadata {
                    customer_id: Some(customer),
                    ..CheckoutMetadata::default()
                },
                Vec::new(),
            ),
        };

        let event = PaymentEvent {
            id: event_id,
            kind: EventKind::CheckoutSessionCompleted,
            session_id,
            amount_pence,
            currency: REPLAY_CURRENCY.to_string(),
            metadata,
            items,
        };

        let now = Utc::now().timestamp();
        let payload = encode_event(&event, now)?;
        let header = self.signer.sign(&payload, now)?;

        self.services
            .processor
            .handle_webhook(&payload, &header)
            .await
    }
}
