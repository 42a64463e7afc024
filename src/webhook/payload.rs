//! Webhook envelope parsing
//!
//! Deliveries arrive as a JSON envelope
//! `{id, type, created?, data: {object}}`. For `checkout.session.completed`
//! the object is a checkout session carrying the amount, currency, the
//! checkout metadata and optionally the expanded line items. The object of
//! any other event type is not interpreted.

use crate::types::{CheckoutMetadata, EventKind, OrderItem, PaymentEvent, SettlementError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<i64>,
    data: EnvelopeData,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line_items: Option<LineItemList>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LineItemList {
    #[serde(default)]
    data: Vec<LineItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LineItem {
    #[serde(default)]
    description: String,
    #[serde(default = "one")]
    quantity: u32,
    #[serde(default)]
    price: Option<LinePrice>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinePrice {
    /// Minor currency units
    unit_amount: i64,
}

fn one() -> u32 {
    1
}

impl From<LineItem> for OrderItem {
    fn from(item: LineItem) -> Self {
        OrderItem {
            name: item.description,
            price: Decimal::new(item.price.map(|p| p.unit_amount).unwrap_or(0), 2),
            quantity: item.quantity,
        }
    }
}

impl From<&OrderItem> for LineItem {
    fn from(item: &OrderItem) -> Self {
        let unit_amount = (item.price * Decimal::ONE_HUNDRED)
            .round()
            .try_into()
            .unwrap_or(0);
        LineItem {
            description: item.name.clone(),
            quantity: item.quantity,
            price: Some(LinePrice { unit_amount }),
        }
    }
}

/// Parse a verified webhook payload into a [`PaymentEvent`]
///
/// # Errors
///
/// `MALFORMED_EVENT` when the envelope is not valid JSON, lacks an id or
/// type, or a completed-checkout object has the wrong shape. A negative
/// amount is also malformed.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, SettlementError> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    if envelope.id.trim().is_empty() {
        return Err(SettlementError::malformed_event("event id is empty"));
    }

    let kind = EventKind::parse(&envelope.kind);
    let session = match kind {
        EventKind::CheckoutSessionCompleted => {
            serde_json::from_value::<SessionObject>(envelope.data.object)?
        }
        EventKind::Other(_) => SessionObject::default(),
    };

    let amount_pence = session.amount_total.unwrap_or(0);
    if amount_pence < 0 {
        return Err(SettlementError::malformed_event(format!(
            "negative amount_total {} on event {}",
            amount_pence, envelope.id
        )));
    }

    Ok(PaymentEvent {
        id: envelope.id,
        kind,
        session_id: session.id,
        amount_pence,
        currency: session.currency.unwrap_or_default().to_ascii_lowercase(),
        metadata: CheckoutMetadata::from_map(&session.metadata),
        items: session
            .line_items
            .map(|list| list.data.into_iter().map(OrderItem::from).collect())
            .unwrap_or_default(),
    })
}

/// Serialize an event into the envelope format accepted by [`parse_event`]
pub fn encode_event(event: &PaymentEvent, created: i64) -> Result<Vec<u8>, SettlementError> {
    let session = SessionObject {
        id: event.session_id.clone(),
        amount_total: Some(event.amount_pence),
        currency: Some(event.currency.clone()),
        metadata: event.metadata.to_map(),
        line_items: if event.items.is_empty() {
            None
        } else {
            Some(LineItemList {
                data: event.items.iter().map(LineItem::from).collect(),
            })
        },
    };

    let envelope = Envelope {
        id: event.id.clone(),
        kind: event.kind.as_str().to_string(),
        created: Some(created),
        data: EnvelopeData {
            object: serde_json::to_value(session)?,
        },
    };

    Ok(serde_json::to_vec(&envelope)?)
}
