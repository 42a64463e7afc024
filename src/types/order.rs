//! Order records
//!
//! Orders are materialized exactly once per confirmed payment event and are
//! never updated afterwards.

use super::account::CustomerId;
use super::event::EventId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Payment status of a stored order
///
/// Orders only exist once a payment is confirmed, so this has a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
        }
    }
}

/// Line item snapshot captured at payment time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    /// Unit price in major currency units
    pub price: Decimal,
    pub quantity: u32,
}

/// Persisted order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer: CustomerId,
    pub items: Vec<OrderItem>,
    /// Total charged, in minor currency units
    pub amount_pence: i64,
    pub currency: String,
    /// Delivery fee fixed at checkout time
    pub delivery_fee_pence: u32,
    pub payment_status: PaymentStatus,
    pub referral_code_used: Option<String>,
    pub referrer: Option<CustomerId>,
    pub created_at: DateTime<Utc>,
    /// Payment event that produced this order
    pub source_event: EventId,
    /// Payment session the customer paid through
    pub payment_session: Option<String>,
}

impl Order {
    /// Total charged in major currency units
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.amount_pence, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_in_major_units() {
        let order = Order {
            id: Uuid::new_v4(),
            customer: "cust-1".to_string(),
            items: vec![],
            amount_pence: 2599,
            currency: "gbp".to_string(),
            delivery_fee_pence: 0,
            payment_status: PaymentStatus::Paid,
            referral_code_used: None,
            referrer: None,
            created_at: Utc::now(),
            source_event: "evt_1".to_string(),
            payment_session: None,
        };

        assert_eq!(order.amount(), Decimal::new(2599, 2));
        assert_eq!(format!("{:.2}", order.amount()), "25.99");
    }

    #[test]
    fn test_item_price_accepts_json_numbers() {
        let item: OrderItem =
            serde_json::from_str(r#"{"name":"Jollof rice","price":8.5,"quantity":2}"#).unwrap();
        assert_eq!(item.price, Decimal::new(85, 1));
        assert_eq!(item.quantity, 2);
    }
}
