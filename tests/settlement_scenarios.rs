//! Settlement scenarios against the library API
//!
//! Each test wires the components over fresh in-memory stores, drives them
//! through checkout and payment confirmation, and checks the resulting
//! accounts and orders.

use chrono::Utc;
use settlement_engine::config::SettlementConfig;
use settlement_engine::core::{CheckoutRequest, SettlementServices};
use settlement_engine::types::{
    CheckoutMetadata, EventKind, PaymentEvent, ReferralRejection, ReferralSettlement,
    SettlementOutcome,
};
use settlement_engine::webhook::encode_event;
use std::num::NonZeroU32;
use std::sync::Arc;

async fn services_with(customers: &[(&str, &str)]) -> SettlementServices {
    let services = SettlementServices::in_memory(&SettlementConfig::default());
    for &(customer, code) in customers {
        services
            .customers
            .register_with_id(customer, Some(code))
            .await
            .unwrap();
    }
    services
}

fn checkout(customer: &str, code: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
        customer_id: customer.to_string(),
        referral_code: code.map(str::to_string),
        delivery_fee_pence: 299,
        items: Vec::new(),
    }
}

fn completed(id: &str, metadata: CheckoutMetadata) -> PaymentEvent {
    PaymentEvent {
        id: id.to_string(),
        kind: EventKind::CheckoutSessionCompleted,
        session_id: Some(format!("cs_{}", id)),
        amount_pence: 2599,
        currency: "gbp".to_string(),
        metadata,
        items: Vec::new(),
    }
}

/// Quote a checkout and build the confirmation the collaborator would send
async fn checkout_and_confirm(
    services: &SettlementServices,
    event_id: &str,
    customer: &str,
    code: Option<&str>,
) -> PaymentEvent {
    let intent = services
        .checkout
        .build(&checkout(customer, code))
        .await
        .unwrap();
    completed(event_id, intent.metadata)
}

fn signed(services_config: &SettlementConfig, event: &PaymentEvent, timestamp: i64) -> (Vec<u8>, String) {
    let payload = encode_event(event, timestamp).unwrap();
    let header = services_config
        .verifier()
        .sign(&payload, timestamp)
        .unwrap();
    (payload, header)
}

#[tokio::test]
async fn referral_redeemed_on_first_confirmation() {
    let services = services_with(&[("a", "JC-AAAAA"), ("b", "JC-BBBBB")]).await;

    let event = checkout_and_confirm(&services, "evt_1", "b", Some("JC-AAAAA")).await;
    let outcome = services.processor.process(event).await.unwrap();

    let SettlementOutcome::Settled(report) = outcome else {
        panic!("expected settlement");
    };
    assert!(report.referral.is_redeemed());

    let a = services.accounts.get("a").await.unwrap().unwrap();
    let b = services.accounts.get("b").await.unwrap().unwrap();
    assert_eq!(a.free_delivery_credits, 1);
    assert!(a.referral_code_redeemed);
    assert_eq!(a.redeemed_by.as_deref(), Some("b"));
    assert_eq!(b.referred_by.as_deref(), Some("a"));

    let order = services.orders.find_by_event("evt_1").await.unwrap().unwrap();
    assert_eq!(order.referral_code_used.as_deref(), Some("JC-AAAAA"));
    assert_eq!(order.referrer.as_deref(), Some("a"));
}

#[tokio::test]
async fn duplicate_confirmation_changes_nothing() {
    let services = services_with(&[("a", "JC-AAAAA"), ("b", "JC-BBBBB")]).await;
    let event = checkout_and_confirm(&services, "evt_1", "b", Some("JC-AAAAA")).await;

    services.processor.process(event.clone()).await.unwrap();
    let before = services.accounts.all().await.unwrap();
    let second = services.processor.process(event).await.unwrap();

    assert_eq!(second.code(), "DUPLICATE_EVENT");
    assert_eq!(services.accounts.all().await.unwrap().len(), before.len());
    let a = services.accounts.get("a").await.unwrap().unwrap();
    assert_eq!(a.free_delivery_credits, 1);
    assert_eq!(services.orders.list_for_customer("b").await.unwrap().len(), 1);
}

#[tokio::test]
async fn own_code_is_rejected_without_changes() {
    let services = services_with(&[("c", "JC-CCCCC")]).await;

    let validation = services.ledger.validate("JC-CCCCC", "c").await.unwrap();

    assert!(!validation.valid);
    assert_eq!(validation.reason, Some(ReferralRejection::SelfReferral));
    let c = services.accounts.get("c").await.unwrap().unwrap();
    assert!(!c.referral_code_redeemed);
    assert!(c.referred_by.is_none());
    assert_eq!(c.free_delivery_credits, 0);
}

#[tokio::test]
async fn credit_quotes_free_delivery_and_is_consumed() {
    let services = services_with(&[("d", "JC-DDDDD")]).await;
    services
        .credits
        .grant("d", NonZeroU32::new(1).unwrap())
        .await
        .unwrap();

    let intent = services.checkout.build(&checkout("d", None)).await.unwrap();
    assert_eq!(intent.quoted_delivery_fee_pence, 0);
    assert!(intent.free_delivery_applied);

    let outcome = services
        .processor
        .process(completed("evt_d", intent.metadata))
        .await
        .unwrap();
    let SettlementOutcome::Settled(report) = outcome else {
        panic!("expected settlement");
    };
    assert!(report.delivery_credit_consumed);

    assert_eq!(services.credits.available("d").await.unwrap(), 0);
    let order = services.orders.find_by_event("evt_d").await.unwrap().unwrap();
    assert_eq!(order.delivery_fee_pence, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirmations_for_the_same_code_redeem_once() {
    let services = services_with(&[("a", "JC-AAAAA"), ("b", "JC-BBBBB"), ("e", "JC-EEEEE")]).await;

    // Both quotes see the code as valid before either payment settles.
    let first = checkout_and_confirm(&services, "evt_b", "b", Some("JC-AAAAA")).await;
    let second = checkout_and_confirm(&services, "evt_e", "e", Some("JC-AAAAA")).await;

    let processor = Arc::new(services.processor.clone());
    let tasks: Vec<_> = [first, second]
        .into_iter()
        .map(|event| {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.process(event).await })
        })
        .collect();

    let mut referrals = Vec::new();
    for task in tasks {
        match task.await.unwrap().unwrap() {
            SettlementOutcome::Settled(report) => referrals.push(report.referral),
            other => panic!("expected settlement, got {:?}", other),
        }
    }

    assert_eq!(referrals.iter().filter(|r| r.is_redeemed()).count(), 1);
    assert!(referrals.iter().any(|r| matches!(
        r,
        ReferralSettlement::Skipped {
            reason: ReferralRejection::CodeAlreadyUsed,
            ..
        }
    )));

    let a = services.accounts.get("a").await.unwrap().unwrap();
    assert_eq!(a.free_delivery_credits, 1);
    assert!(services.orders.find_by_event("evt_b").await.unwrap().is_some());
    assert!(services.orders.find_by_event("evt_e").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redelivery_settles_once() {
    let services = services_with(&[("a", "JC-AAAAA"), ("b", "JC-BBBBB")]).await;
    let event = checkout_and_confirm(&services, "evt_1", "b", Some("JC-AAAAA")).await;

    let processor = Arc::new(services.processor.clone());
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let processor = Arc::clone(&processor);
            let event = event.clone();
            tokio::spawn(async move { processor.process(event).await })
        })
        .collect();

    let mut settled = 0;
    for task in tasks {
        if let SettlementOutcome::Settled(_) = task.await.unwrap().unwrap() {
            settled += 1;
        }
    }

    assert_eq!(settled, 1);
    assert_eq!(services.orders.all().await.unwrap().len(), 1);
    let a = services.accounts.get("a").await.unwrap().unwrap();
    assert_eq!(a.free_delivery_credits, 1);
}

#[tokio::test]
async fn forged_and_stale_webhooks_are_rejected() {
    let config = SettlementConfig::default();
    let services = services_with(&[("a", "JC-AAAAA"), ("b", "JC-BBBBB")]).await;
    let event = checkout_and_confirm(&services, "evt_1", "b", Some("JC-AAAAA")).await;

    let now = Utc::now().timestamp();
    let (payload, _) = signed(&config, &event, now);
    let forged = SettlementConfig {
        webhook_secret: "whsec_someone_else".to_string(),
        ..SettlementConfig::default()
    };
    let (_, forged_header) = signed(&forged, &event, now);
    let (stale_payload, stale_header) = signed(&config, &event, now - 3600);

    for (payload, header) in [(&payload, &forged_header), (&stale_payload, &stale_header)] {
        let error = services
            .processor
            .handle_webhook(payload, header)
            .await
            .unwrap_err();
        assert_eq!(error.code(), "SIGNATURE_INVALID");
        assert!(!error.is_retryable());
    }

    assert!(services.orders.all().await.unwrap().is_empty());
    assert!(services.events.get("evt_1").await.unwrap().is_none());
    let a = services.accounts.get("a").await.unwrap().unwrap();
    assert_eq!(a.free_delivery_credits, 0);

    // The genuine delivery still settles afterwards.
    let (payload, header) = signed(&config, &event, now);
    let outcome = services.processor.handle_webhook(&payload, &header).await.unwrap();
    assert_eq!(outcome.code(), "SETTLED");
}

#[tokio::test]
async fn other_event_types_are_ignored() {
    let services = services_with(&[("b", "JC-BBBBB")]).await;
    let mut event = checkout_and_confirm(&services, "evt_1", "b", None).await;
    event.kind = EventKind::parse("payment_intent.created");

    let outcome = services.processor.process(event).await.unwrap();

    assert_eq!(outcome.code(), "IGNORED");
    assert!(services.orders.all().await.unwrap().is_empty());
    assert!(services.events.get("evt_1").await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn credits_never_go_below_zero() {
    let services = services_with(&[("d", "JC-DDDDD")]).await;
    services
        .credits
        .grant("d", NonZeroU32::new(3).unwrap())
        .await
        .unwrap();

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let credits = services.credits.clone();
            tokio::spawn(async move { credits.consume_if_available("d").await })
        })
        .collect();

    let mut consumed = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() {
            consumed += 1;
        }
    }

    assert_eq!(consumed, 3);
    assert_eq!(services.credits.available("d").await.unwrap(), 0);
}

#[tokio::test]
async fn nobody_refers_themselves() {
    let services = services_with(&[("a", "JC-AAAAA"), ("b", "JC-BBBBB")]).await;

    for (event_id, customer, code) in [
        ("evt_1", "a", "JC-AAAAA"),
        ("evt_2", "b", "JC-AAAAA"),
        ("evt_3", "a", "JC-BBBBB"),
    ] {
        let event = completed(
            event_id,
            CheckoutMetadata {
                customer_id: Some(customer.to_string()),
                referral_code: Some(code.to_string()),
                ..CheckoutMetadata::default()
            },
        );
        services.processor.process(event).await.unwrap();
    }

    for account in services.accounts.all().await.unwrap() {
        assert_ne!(account.referred_by.as_deref(), Some(account.customer.as_str()));
    }
    let a = services.accounts.get("a").await.unwrap().unwrap();
    let b = services.accounts.get("b").await.unwrap().unwrap();
    assert_eq!(a.redeemed_by.as_deref(), Some("b"));
    assert_eq!(b.referred_by.as_deref(), Some("a"));
}
