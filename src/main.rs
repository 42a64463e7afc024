//! Settlement engine replay CLI
//!
//! Replays a log of registrations, credit grants, checkouts and payment
//! confirmations through the settlement engine and prints the final account
//! states.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > accounts.csv
//! cargo run -- --strategy sync operations.csv > accounts.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 operations.csv > accounts.csv
//! cargo run -- --orders orders.csv operations.csv > accounts.csv
//! ```
//!
//! Settings may also come from the environment or a `.env` file:
//! `STRIPE_WEBHOOK_SECRET`, `WEBHOOK_TOLERANCE_SECS`, `REFERRAL_CODE_PREFIX`,
//! and `SETTLEMENT_LOG` for the log filter.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, output not writable, etc.)

use settlement_engine::io::write_orders_csv;
use settlement_engine::{cli, strategy, telemetry, SettlementError};
use std::fs::File;
use std::process;

fn main() {
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let args = cli::parse_args();

    let strategy = {
        let batch_config = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, batch_config, args.to_settlement_config())
    };

    let mut output = std::io::stdout();
    let summary = match strategy.process(&args.input_file, &mut output) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Replay failed");
            process::exit(1);
        }
    };

    tracing::info!(
        applied = summary.applied,
        failed = summary.failed,
        rejected = summary.rejected,
        accounts = summary.accounts.len(),
        orders = summary.orders.len(),
        "Replay finished"
    );

    if let Some(path) = &args.orders_file {
        let written = File::create(path)
            .map_err(SettlementError::from)
            .and_then(|mut file| write_orders_csv(&summary.orders, &mut file));
        if let Err(e) = written {
            tracing::error!(path = %path.display(), error = %e, "Failed to write orders");
            process::exit(1);
        }
    }
}
