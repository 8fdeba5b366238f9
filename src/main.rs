//! Settlement replay CLI
//!
//! Command-line interface for replaying a backlink-marketplace event
//! log through the settlement core.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- events.csv > balances.csv
//! cargo run -- --strategy sync events.csv > balances.csv
//! cargo run -- --strategy async --batch-size 2000 --max-concurrent 8 events.csv > balances.csv
//! cargo run -- --publisher-rate 0.80 --deposit-fee-rate 0.10 events.csv > balances.csv
//! ```
//!
//! The program reads marketplace events from the input CSV, drives them
//! through the settlement engine using the selected strategy, and writes
//! the final account balances to stdout. Set `RUST_LOG` to control log
//! verbosity (e.g. `RUST_LOG=linkmarket_engine=debug`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, invalid rates, etc.)

use linkmarket_engine::cli;
use linkmarket_engine::strategy;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    let policy = match args.to_policy() {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let strategy = {
        let config = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy, config, policy)
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
