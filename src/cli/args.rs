use crate::core::CommissionPolicy;
use crate::strategy::BatchConfig;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay a marketplace event log through the settlement core
#[derive(Parser, Debug)]
#[command(name = "linkmarket-engine")]
#[command(
    about = "Replay a backlink-marketplace event log and emit final account balances",
    long_about = None
)]
pub struct CliArgs {
    /// Input CSV file path containing the event log
    #[arg(value_name = "INPUT", help = "Path to the input event-log CSV")]
    pub input_file: PathBuf,

    /// Processing strategy to use for the replay
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        help = "Replay strategy: 'sync' for single-threaded or 'async' for batched parallel"
    )]
    pub strategy: StrategyType,

    /// Number of events per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of events per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of concurrent worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Worker threads for batch replay (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Publisher's share of a settled placement price
    #[arg(
        long = "publisher-rate",
        value_name = "RATE",
        help = "Publisher commission rate, 0..=1 (default: 0.70)"
    )]
    pub publisher_rate: Option<Decimal>,

    /// Platform fee taken from advertiser deposits
    #[arg(
        long = "deposit-fee-rate",
        value_name = "RATE",
        help = "Deposit fee rate, 0..=1 (default: 0.05)"
    )]
    pub deposit_fee_rate: Option<Decimal>,
}

/// Available replay strategies
#[derive(Clone, Debug, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Uses the provided values where given, falling back to defaults.
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

    /// Create a CommissionPolicy from CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error string if a provided rate is outside `0..=1`.
    pub fn to_policy(&self) -> Result<CommissionPolicy, String> {
        let default = CommissionPolicy::default();
        CommissionPolicy::new(
            self.publisher_rate.unwrap_or(default.publisher_rate),
            self.deposit_fee_rate.unwrap_or(default.deposit_fee_rate),
        )
        .map_err(|e| e.to_string())
    }
}

/// Parse command-line arguments
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_strategy(&["program", "events.csv"], StrategyType::Async)]
    #[case::explicit_sync(&["program", "--strategy", "sync", "events.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--strategy", "async", "events.csv"], StrategyType::Async)]
    fn test_strategy_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        match (&parsed.strategy, &expected) {
            (StrategyType::Sync, StrategyType::Sync) => (),
            (StrategyType::Async, StrategyType::Async) => (),
            _ => panic!("Expected {:?}, got {:?}", expected, parsed.strategy),
        }
    }

    #[rstest]
    #[case::batch_size(&["program", "--batch-size", "2000", "events.csv"], Some(2000), None)]
    #[case::max_concurrent(&["program", "--max-concurrent", "8", "events.csv"], None, Some(8))]
    #[case::no_options(&["program", "events.csv"], None, None)]
    fn test_batch_options(
        #[case] args: &[&str],
        #[case] batch_size: Option<usize>,
        #[case] max_concurrent: Option<usize>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.batch_size, batch_size);
        assert_eq!(parsed.max_concurrent_batches, max_concurrent);
    }

    #[test]
    fn test_default_policy() {
        let parsed = CliArgs::try_parse_from(["program", "events.csv"]).unwrap();
        let policy = parsed.to_policy().unwrap();
        assert_eq!(policy, CommissionPolicy::default());
    }

    #[test]
    fn test_custom_rates() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--publisher-rate",
            "0.80",
            "--deposit-fee-rate",
            "0.10",
            "events.csv",
        ])
        .unwrap();

        let policy = parsed.to_policy().unwrap();
        assert_eq!(policy.publisher_rate, Decimal::new(80, 2));
        assert_eq!(policy.deposit_fee_rate, Decimal::new(10, 2));
    }

    #[test]
    fn test_out_of_range_rate_rejected() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--publisher-rate",
            "1.5",
            "events.csv",
        ])
        .unwrap();

        assert!(parsed.to_policy().is_err());
    }

    #[test]
    fn test_missing_input_fails() {
        assert!(CliArgs::try_parse_from(["program"]).is_err());
    }

    #[test]
    fn test_to_batch_config_defaults() {
        let parsed = CliArgs::try_parse_from(["program", "events.csv"]).unwrap();
        let config = parsed.to_batch_config();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.max_concurrent_batches, num_cpus::get());
    }
}
