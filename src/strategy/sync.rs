//! Synchronous processing strategy
//!
//! Replays operations one at a time in file order on a single-threaded
//! runtime. The settlement components are async, so a current-thread tokio
//! runtime drives them; no tasks are spawned and every operation completes
//! before the next row is read.
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Operation handling to `Replayer`
//! - CSV output to `csv_format::write_accounts_csv`

use crate::config::SettlementConfig;
use crate::io::csv_format::write_accounts_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::replayer::Replayer;
use crate::strategy::{ProcessingStrategy, ReplaySummary};
use crate::types::SettlementError;
use std::io::Write;
use std::path::Path;

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use settlement_engine::config::SettlementConfig;
/// use settlement_engine::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
///
/// let strategy = SyncProcessingStrategy::new(SettlementConfig::default());
/// let mut output = std::io::stdout();
///
/// strategy.process(Path::new("operations.csv"), &mut output)
///     .expect("Replay failed");
/// ```
#[derive(Debug, Clone)]
pub struct SyncProcessingStrategy {
    settlement: SettlementConfig,
}

impl SyncProcessingStrategy {
    pub fn new(settlement: SettlementConfig) -> Self {
        Self { settlement }
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Replay every row in order and write the resulting accounts
    ///
    /// Fatal errors (file not found, runtime or output failures) are returned
    /// immediately. Row and operation errors are logged and counted.
    fn process(
        &self,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, SettlementError> {
        let reader = SyncReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| SettlementError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        let summary = runtime.block_on(async {
            let replayer = Replayer::new(&self.settlement);
            let (mut applied, mut failed, mut rejected) = (0, 0, 0);

            for row in reader {
                match row {
                    Ok(operation) => {
                        let customer = operation.customer().to_string();
                        let operation_type = operation.operation_type();
                        match replayer.apply(operation).await {
                            Ok(()) => applied += 1,
                            Err(e) => {
                                failed += 1;
                                tracing::warn!(
                                    customer = %customer,
                                    operation = ?operation_type,
                                    code = e.code(),
                                    error = %e,
                                    "Replay operation failed"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        rejected += 1;
                        tracing::warn!(error = %e, "Skipping replay row");
                    }
                }
            }

            ReplaySummary::collect(&replayer, applied, failed, rejected).await
        })?;

        write_accounts_csv(&summary.accounts, output)?;

        Ok(summary)
    }
}
