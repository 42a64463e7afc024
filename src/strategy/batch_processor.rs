//! Batch processor for parallel replay
//!
//! Processes a batch of operations with one task per customer. A customer's
//! operations run in file order; different customers run in parallel.
//!
//! # Phases
//!
//! Referral checkouts and payments read another customer's account (the code
//! owner), so a `register` is applied before the rest of the batch. It is only
//! moved past other customers' operations: a registration that follows one of
//! its own customer's operations stays in place, matching the sync strategy.
//!
//! ```text
//! Batch → [leading register ops] → partition by customer → spawn → barrier
//!       → [other ops]            → partition by customer → spawn → barrier
//! ```
//!
//! Cross-customer effects inside one batch (a referrer's credit landing while
//! the referrer is checking out) have no defined order. Sequential batches
//! keep ordering intact across batch boundaries.

use crate::strategy::replayer::Replayer;
use crate::types::{CustomerId, Operation, OperationType, SettlementError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Result of applying a single operation
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub operation: Operation,
    pub result: Result<(), SettlementError>,
}

#[derive(Clone)]
pub struct BatchProcessor {
    replayer: Arc<Replayer>,
}

impl BatchProcessor {
    pub fn new(replayer: Arc<Replayer>) -> Self {
        Self { replayer }
    }

    /// Group operations by customer, preserving order within each group
    pub fn partition_by_customer(
        &self,
        batch: Vec<Operation>,
    ) -> HashMap<CustomerId, Vec<Operation>> {
        let mut customer_batches: HashMap<CustomerId, Vec<Operation>> = HashMap::new();

        for operation in batch {
            customer_batches
                .entry(operation.customer().to_string())
                .or_default()
                .push(operation);
        }

        customer_batches
    }

    /// Apply one customer's operations sequentially
    pub async fn process_customer_operations(
        &self,
        operations: Vec<Operation>,
    ) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(operations.len());

        for operation in operations {
            let result = self.replayer.apply(operation.clone()).await;
            if let Err(e) = &result {
                tracing::warn!(
                    customer = %operation.customer(),
                    operation = ?operation.operation_type(),
                    code = e.code(),
                    error = %e,
                    "Replay operation failed"
                );
            }
            results.push(ProcessingResult { operation, result });
        }

        results
    }

    /// Process a batch: leading registrations first, then everything else
    ///
    /// Returns once every spawned task has finished.
    pub async fn process_batch(&self, batch: Vec<Operation>) -> Vec<ProcessingResult> {
        let (registrations, operations) = split_leading_registrations(batch);

        let mut results = self.run_partitioned(registrations).await;
        results.extend(self.run_partitioned(operations).await);
        results
    }

    async fn run_partitioned(&self, operations: Vec<Operation>) -> Vec<ProcessingResult> {
        if operations.is_empty() {
            return Vec::new();
        }

        let customer_batches = self.partition_by_customer(operations);

        let mut tasks = Vec::with_capacity(customer_batches.len());
        for (_customer, operations) in customer_batches {
            let processor = self.clone();
            tasks.push(tokio::spawn(async move {
                processor.process_customer_operations(operations).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(customer_results) => results.extend(customer_results),
                Err(e) => tracing::error!(error = %e, "Replay task panicked"),
            }
        }

        results
    }
}

/// Split off registrations not preceded by another operation of the same
/// customer; everything else keeps file order
fn split_leading_registrations(batch: Vec<Operation>) -> (Vec<Operation>, Vec<Operation>) {
    let mut seen: HashSet<CustomerId> = HashSet::new();
    let mut registrations = Vec::new();
    let mut operations = Vec::new();

    for operation in batch {
        let hoistable = operation.operation_type() == OperationType::Register
            && !seen.contains(operation.customer());
        if hoistable {
            registrations.push(operation);
        } else {
            seen.insert(operation.customer().to_string());
            operations.push(operation);
        }
    }

    (registrations, operations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettlementConfig;
    use std::num::NonZeroU32;

    fn processor() -> (BatchProcessor, Arc<Replayer>) {
        let replayer = Arc::new(Replayer::new(&SettlementConfig::default()));
        (BatchProcessor::new(Arc::clone(&replayer)), replayer)
    }

    fn register(customer: &str, code: &str) -> Operation {
        Operation::Register {
            customer: customer.to_string(),
            referral_code: Some(code.to_string()),
        }
    }

    fn grant(customer: &str, credits: u32) -> Operation {
        Operation::Grant {
            customer: customer.to_string(),
            credits: NonZeroU32::new(credits).unwrap(),
        }
    }

    #[test]
    fn test_partition_by_customer_preserves_order() {
        let (processor, _) = processor();

        let partitioned = processor.partition_by_customer(vec![
            grant("a", 1),
            grant("b", 5),
            grant("a", 2),
        ]);

        assert_eq!(partitioned.len(), 2);
        assert_eq!(partitioned["a"], vec![grant("a", 1), grant("a", 2)]);
        assert_eq!(partitioned["b"], vec![grant("b", 5)]);
    }

    #[test]
    fn test_partition_by_customer_empty_batch() {
        let (processor, _) = processor();
        assert!(processor.partition_by_customer(vec![]).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registrations_run_before_referral_checkouts() {
        let (processor, replayer) = processor();

        // The referee's checkout and payment precede the referrer's
        // registration in the batch.
        let results = processor
            .process_batch(vec![
                register("b", "JC-BBBBB"),
                Operation::Checkout {
                    customer: "b".to_string(),
                    referral_code: Some("JC-AAAAA".to_string()),
                    delivery_fee_pence: 299,
                },
                Operation::Payment {
                    customer: "b".to_string(),
                    event_id: "evt_1".to_string(),
                    amount_pence: 1000,
                },
                register("a", "JC-AAAAA"),
            ])
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.result.is_ok()));

        let a = replayer.services().accounts.get("a").await.unwrap().unwrap();
        assert_eq!(a.free_delivery_credits, 1);
        assert_eq!(a.redeemed_by.as_deref(), Some("b"));
    }

    #[test]
    fn test_registration_stays_behind_its_own_customer() {
        let (registrations, operations) = split_leading_registrations(vec![
            register("a", "JC-AAAAA"),
            grant("x", 1),
            register("x", "JC-XXXXX"),
            register("b", "JC-BBBBB"),
            grant("x", 2),
        ]);

        assert_eq!(
            registrations,
            vec![register("a", "JC-AAAAA"), register("b", "JC-BBBBB")]
        );
        assert_eq!(
            operations,
            vec![grant("x", 1), register("x", "JC-XXXXX"), grant("x", 2)]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_grant_before_registration_fails_as_in_file_order() {
        let (processor, replayer) = processor();

        let results = processor
            .process_batch(vec![
                grant("x", 1),
                register("x", "JC-XXXXX"),
                grant("x", 2),
            ])
            .await;

        let failed: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].operation, grant("x", 1));
        assert_eq!(
            failed[0].result.as_ref().unwrap_err().code(),
            "USER_NOT_FOUND"
        );

        let x = replayer.services().accounts.get("x").await.unwrap().unwrap();
        assert_eq!(x.free_delivery_credits, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failures_are_reported_per_operation() {
        let (processor, _) = processor();

        let results = processor
            .process_batch(vec![register("a", "JC-AAAAA"), grant("ghost", 1)])
            .await;

        let failed: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].operation, grant("ghost", 1));
    }
}
