//! Thread-safe in-memory order storage
//!
//! Orders are keyed by their source payment event. The first insert for an
//! event wins and later inserts get the stored order back, which makes order
//! materialization idempotent under redelivery.

use crate::core::traits::{OrderInsert, OrderStore, StoreResult};
use crate::types::{EventId, Order};
use async_trait::async_trait;
use dashmap::DashMap;

/// Append-only order store backed by `DashMap`
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    /// Orders by source event id
    orders: DashMap<EventId, Order>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_if_absent(&self, order: Order) -> StoreResult<OrderInsert> {
        let mut created = false;
        let stored = self
            .orders
            .entry(order.source_event.clone())
            .or_insert_with(|| {
                created = true;
                order
            })
            .value()
            .clone();

        if created {
            Ok(OrderInsert::Created(stored))
        } else {
            Ok(OrderInsert::Existing(stored))
        }
    }

    async fn find_by_event(&self, event_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.orders.get(event_id).map(|entry| entry.value().clone()))
    }

    async fn list_for_customer(&self, customer: &str) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.value().customer == customer)
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn all(&self) -> StoreResult<Vec<Order>> {
        Ok(self
            .orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }
}
