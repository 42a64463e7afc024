//! Asynchronous batch processing strategy
//!
//! Replays operations in batches on a multi-threaded runtime, partitioned by
//! customer within each batch.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── BatchProcessor (customer partitioning + spawned tasks)
//!     └── Replayer (settlement components over shared DashMap stores)
//! ```
//!
//! Batches are processed one after another, so a customer's operations keep
//! file order across batch boundaries. Within a batch, registrations are
//! applied first and the remaining operations run one task per customer.

use crate::config::SettlementConfig;
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_accounts_csv;
use crate::strategy::batch_processor::BatchProcessor;
use crate::strategy::replayer::Replayer;
use crate::strategy::{ProcessingStrategy, ReplaySummary};
use crate::types::SettlementError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Configuration for batch processing
///
/// Controls how operations are batched and the number of worker threads
/// for parallel processing within each batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of operations per batch
    pub batch_size: usize,
    /// Number of runtime worker threads
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a config, replacing zero values with defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                default = default.batch_size,
                "Invalid batch_size (0), using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            tracing::warn!(
                default = default.max_concurrent_batches,
                "Invalid max_concurrent_batches (0), using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: BatchConfig,
    settlement: SettlementConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(config: BatchConfig, settlement: SettlementConfig) -> Self {
        Self { config, settlement }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, SettlementError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| SettlementError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        let summary = runtime.block_on(async {
            let replayer = Arc::new(Replayer::new(&self.settlement));
            let processor = BatchProcessor::new(Arc::clone(&replayer));

            let file = tokio::fs::File::open(input_path).await.map_err(|e| {
                match e.kind() {
                    std::io::ErrorKind::NotFound => SettlementError::FileNotFound {
                        path: input_path.display().to_string(),
                    },
                    _ => SettlementError::from(e),
                }
            })?;

            // csv-async reads futures::io, tokio files implement tokio::io
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            let (mut applied, mut failed) = (0, 0);
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                for result in processor.process_batch(batch).await {
                    match result.result {
                        Ok(()) => applied += 1,
                        Err(_) => failed += 1,
                    }
                }
            }

            ReplaySummary::collect(&replayer, applied, failed, reader.rejected()).await
        })?;

        write_accounts_csv(&summary.accounts, output)?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[rstest]
    #[case::zero_batch_size(0, 4, 1000, 4)]
    #[case::zero_workers(50, 0, 50, num_cpus::get())]
    #[case::valid(50, 4, 50, 4)]
    fn test_batch_config_new(
        #[case] batch_size: usize,
        #[case] workers: usize,
        #[case] expected_batch_size: usize,
        #[case] expected_workers: usize,
    ) {
        let config = BatchConfig::new(batch_size, workers);
        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_workers);
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy = AsyncProcessingStrategy::new(BatchConfig::default(), SettlementConfig::default());
        let mut output = Vec::new();

        let error = strategy
            .process(Path::new("nonexistent.csv"), &mut output)
            .unwrap_err();
        assert_eq!(error.code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_async_strategy_maintains_ordering_across_batches() {
        // The duplicate delivery lands in a later batch than the first one.
        let file = create_temp_csv(
            "type,customer,event,code,amount,fee\n\
             register,a,,JC-AAAAA,,\n\
             register,b,,JC-BBBBB,,\n\
             checkout,b,,JC-AAAAA,,299\n\
             payment,b,evt_1,,25.99,\n\
             payment,b,evt_1,,25.99,\n\
             grant,b,,,2,\n\
             checkout,b,,,,299\n",
        );

        let strategy = AsyncProcessingStrategy::new(BatchConfig::new(2, 4), SettlementConfig::default());
        let mut output = Vec::new();

        let summary = strategy.process(file.path(), &mut output).unwrap();

        assert_eq!(summary.applied, 7);
        assert_eq!(summary.orders.len(), 1);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "customer,referral_code,referral_code_redeemed,redeemed_by,referred_by,free_delivery_credits\n\
             a,JC-AAAAA,true,b,,1\n\
             b,JC-BBBBB,false,,a,2\n"
        );
    }
}
