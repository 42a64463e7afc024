//! Thread-safe in-memory processed-event storage
//!
//! Each payment event id maps to a [`ProcessedEvent`] record. Claiming happens
//! inside the map entry's lock so that exactly one caller can move an event
//! from unseen or released to in flight.
//!
//! An in-flight claim is a lease. An attempt that disappears without
//! releasing its claim (a dropped future, a panicking task) leaves the record
//! in flight; once the lease has run out the next delivery takes it over and
//! resumes from the recorded progress.

use crate::config::DEFAULT_CLAIM_LEASE_SECS;
use crate::core::traits::{
    EventClaim, EventState, ProcessedEvent, ProcessedEventStore, StoreResult,
};
use crate::types::{EventId, SettlementError, SettlementProgress, SettlementReport};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

/// Idempotency gate backed by `DashMap`
#[derive(Debug)]
pub struct InMemoryEventStore {
    events: DashMap<EventId, ProcessedEvent>,
    /// Seconds an in-flight claim is honoured before it may be taken over
    lease_secs: i64,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::with_lease(DEFAULT_CLAIM_LEASE_SECS)
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(lease_secs: i64) -> Self {
        Self {
            events: DashMap::new(),
            lease_secs: lease_secs.max(0),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Apply a change to an event the caller holds
    fn update<F>(&self, event_id: &str, operation: &str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut ProcessedEvent),
    {
        let mut entry = self.events.get_mut(event_id).ok_or_else(|| {
            SettlementError::storage_unavailable(
                operation,
                format!("event {} has not been claimed", event_id),
            )
        })?;
        f(entry.value_mut());
        Ok(())
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryEventStore {
    async fn claim(&self, event_id: &str) -> StoreResult<EventClaim> {
        let mut created = false;
        let mut entry = self
            .events
            .entry(event_id.to_string())
            .or_insert_with(|| {
                created = true;
                ProcessedEvent {
                    event_id: event_id.to_string(),
                    state: EventState::InFlight,
                    progress: SettlementProgress::default(),
                    attempts: 1,
                    report: None,
                    claimed_at: Utc::now(),
                    processed_at: None,
                }
            });

        if created {
            return Ok(EventClaim::Acquired(SettlementProgress::default()));
        }

        let record = entry.value_mut();
        let now = Utc::now();
        match record.state {
            EventState::Processed => Ok(EventClaim::Processed(record.report.clone())),
            EventState::InFlight if (now - record.claimed_at).num_seconds() < self.lease_secs => {
                Ok(EventClaim::InFlight)
            }
            EventState::InFlight | EventState::Released => {
                if record.state == EventState::InFlight {
                    tracing::warn!(
                        event_id = %event_id,
                        claimed_at = %record.claimed_at,
                        attempts = record.attempts,
                        "Taking over expired event claim"
                    );
                }
                record.state = EventState::InFlight;
                record.attempts += 1;
                record.claimed_at = now;
                Ok(EventClaim::Acquired(record.progress.clone()))
            }
        }
    }

    async fn record_progress(
        &self,
        event_id: &str,
        progress: &SettlementProgress,
    ) -> StoreResult<()> {
        self.update(event_id, "record progress", |record| {
            record.progress = progress.clone();
        })
    }

    async fn complete(&self, event_id: &str, report: &SettlementReport) -> StoreResult<()> {
        self.update(event_id, "complete event", |record| {
            record.state = EventState::Processed;
            record.report = Some(report.clone());
            record.processed_at = Some(Utc::now());
        })
    }

    async fn release(&self, event_id: &str) -> StoreResult<()> {
        self.update(event_id, "release event", |record| {
            if record.state == EventState::InFlight {
                record.state = EventState::Released;
            }
        })
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<ProcessedEvent>> {
        Ok(self.events.get(event_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReferralSettlement;
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_claim_lifecycle() {
        let store = InMemoryEventStore::new();

        assert_eq!(
            store.claim("evt_1").await.unwrap(),
            EventClaim::Acquired(SettlementProgress::default())
        );
        assert_eq!(store.claim("evt_1").await.unwrap(), EventClaim::InFlight);

        let report = SettlementReport {
            event_id: "evt_1".to_string(),
            customer: "b".to_string(),
            order_id: Uuid::new_v4(),
            referral: ReferralSettlement::NotRequested,
            delivery_credit_consumed: false,
        };
        store.complete("evt_1", &report).await.unwrap();

        assert_eq!(
            store.claim("evt_1").await.unwrap(),
            EventClaim::Processed(Some(report))
        );
        let record = store.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.state, EventState::Processed);
        assert!(record.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_released_event_resumes_with_progress() {
        let store = InMemoryEventStore::new();
        store.claim("evt_1").await.unwrap();

        let progress = SettlementProgress {
            order_id: Some(Uuid::new_v4()),
            ..SettlementProgress::default()
        };
        store.record_progress("evt_1", &progress).await.unwrap();
        store.release("evt_1").await.unwrap();

        assert_eq!(
            store.claim("evt_1").await.unwrap(),
            EventClaim::Acquired(progress)
        );
        let record = store.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.state, EventState::InFlight);
    }

    #[tokio::test]
    async fn test_expired_claim_is_taken_over_with_progress() {
        let store = InMemoryEventStore::with_lease(0);
        store.claim("evt_1").await.unwrap();

        let progress = SettlementProgress {
            order_id: Some(Uuid::new_v4()),
            ..SettlementProgress::default()
        };
        store.record_progress("evt_1", &progress).await.unwrap();

        // The first holder never releases; its lease is already over.
        assert_eq!(
            store.claim("evt_1").await.unwrap(),
            EventClaim::Acquired(progress)
        );
        let record = store.get("evt_1").await.unwrap().unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.state, EventState::InFlight);
    }

    #[tokio::test]
    async fn test_live_claim_is_not_taken_over() {
        let store = InMemoryEventStore::with_lease(3600);
        store.claim("evt_1").await.unwrap();

        assert_eq!(store.claim("evt_1").await.unwrap(), EventClaim::InFlight);
        assert_eq!(store.get("evt_1").await.unwrap().unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_progress_requires_claim() {
        let store = InMemoryEventStore::new();
        let error = store
            .record_progress("evt_x", &SettlementProgress::default())
            .await
            .unwrap_err();
        assert_eq!(error.code(), "STORAGE_UNAVAILABLE");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_owner() {
        let store = Arc::new(InMemoryEventStore::new());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.claim("evt_1").await }));
        }

        let mut acquired = 0;
        for handle in handles {
            if let EventClaim::Acquired(_) = handle.await.unwrap().unwrap() {
                acquired += 1;
            }
        }
        assert_eq!(acquired, 1);
    }
}
