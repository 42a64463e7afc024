//! Processing strategy module for operation replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! encompassing both CSV parsing and settlement processing. Different
//! implementations (synchronous, asynchronous batch) can be selected at
//! runtime and must produce the same final state for the same log.

use crate::cli::StrategyType;
use crate::config::SettlementConfig;
use crate::types::{Account, Order, SettlementError};
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod batch_processor;
pub mod replayer;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use replayer::{ReplaySessions, Replayer};
pub use sync::SyncProcessingStrategy;

/// Final state and counters of a replay run
#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    /// Operations applied without error
    pub applied: usize,
    /// Operations that parsed but failed when applied
    pub failed: usize,
    /// Rows skipped because they could not be parsed
    pub rejected: usize,
    pub accounts: Vec<Account>,
    pub orders: Vec<Order>,
}

impl ReplaySummary {
    /// Snapshot the replayer's stores into a summary
    pub(crate) async fn collect(
        replayer: &Replayer,
        applied: usize,
        failed: usize,
        rejected: usize,
    ) -> Result<Self, SettlementError> {
        let services = replayer.services();
        Ok(Self {
            applied,
            failed,
            rejected,
            accounts: services.accounts.all().await?,
            orders: services.orders.all().await?,
        })
    }
}

/// Processing strategy trait for complete replay pipelines
///
/// Each strategy reads operations from a CSV file, applies them to a fresh
/// set of settlement components, and writes the final account states to
/// output.
pub trait ProcessingStrategy: Send + Sync {
    /// Replay operations from input file and write accounts to output
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the replay log
    /// * `output` - Writer for the accounts CSV
    ///
    /// # Returns
    ///
    /// * `Ok(ReplaySummary)` when the log was read to the end, even if some
    ///   rows or operations failed
    /// * `Err(SettlementError)` for fatal errors (file not found, I/O error,
    ///   output cannot be written)
    ///
    /// Individual row and operation failures are logged and counted but do
    /// not stop the replay.
    fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, SettlementError>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `batch_config` - Optional configuration for async batch processing (ignored for sync)
/// * `settlement` - Settlement configuration shared by both strategies
pub fn create_strategy(
    strategy_type: StrategyType,
    batch_config: Option<BatchConfig>,
    settlement: SettlementConfig,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(settlement)),
        StrategyType::Async => {
            let config = batch_config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config, settlement))
        }
    }
}
