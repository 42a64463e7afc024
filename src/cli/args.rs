//! Command-line arguments for the replay binary
//!
//! Every settlement setting can also come from the environment (and so from a
//! `.env` file loaded at start-up); flags take precedence.

use crate::config::{
    SettlementConfig, DEFAULT_CLAIM_LEASE_SECS, DEFAULT_REFERRAL_CODE_PREFIX, DEFAULT_WEBHOOK_SECRET,
};
use crate::strategy::BatchConfig;
use crate::webhook::DEFAULT_TOLERANCE_SECS;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Replay checkout and payment operations through the settlement engine
#[derive(Parser, Debug)]
#[command(name = "settlement-engine")]
#[command(about = "Replay checkout and payment operations through the settlement engine", long_about = None)]
pub struct CliArgs {
    /// Replay log path
    #[arg(value_name = "INPUT", help = "Path to the replay log CSV")]
    pub input_file: PathBuf,

    /// Processing strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Processing strategy: 'sync' replays in file order, 'async' in parallel batches"
    )]
    pub strategy: StrategyType,

    /// Number of operations per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of operations per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Number of worker threads (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Where to write the orders CSV
    #[arg(long = "orders", value_name = "PATH", help = "Also write settled orders to this CSV file")]
    pub orders_file: Option<PathBuf>,

    #[arg(
        long = "webhook-secret",
        env = "STRIPE_WEBHOOK_SECRET",
        value_name = "SECRET",
        default_value = DEFAULT_WEBHOOK_SECRET,
        hide_env_values = true,
        help = "Secret used to sign and verify replayed payment events"
    )]
    pub webhook_secret: String,

    #[arg(
        long = "signature-tolerance",
        env = "WEBHOOK_TOLERANCE_SECS",
        value_name = "SECONDS",
        default_value_t = DEFAULT_TOLERANCE_SECS,
        help = "Accepted age of a webhook signature timestamp"
    )]
    pub signature_tolerance_secs: i64,

    #[arg(
        long = "claim-lease",
        env = "CLAIM_LEASE_SECS",
        value_name = "SECONDS",
        default_value_t = DEFAULT_CLAIM_LEASE_SECS,
        help = "Age after which an unfinished settlement attempt may be taken over"
    )]
    pub claim_lease_secs: i64,

    #[arg(
        long = "referral-prefix",
        env = "REFERRAL_CODE_PREFIX",
        value_name = "PREFIX",
        default_value = DEFAULT_REFERRAL_CODE_PREFIX,
        help = "Prefix of generated referral codes"
    )]
    pub referral_prefix: String,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values fall back to defaults; zero values are replaced by
    /// defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Create a validated SettlementConfig from CLI arguments
    pub fn to_settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            referral_code_prefix: self.referral_prefix.clone(),
            webhook_secret: self.webhook_secret.clone(),
            signature_tolerance_secs: self.signature_tolerance_secs,
            claim_lease_secs: self.claim_lease_secs,
            ..SettlementConfig::default()
        }
        .validated()
    }
}
