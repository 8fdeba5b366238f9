//! Benchmark suite for comparing replay strategies
//!
//! Compares the synchronous and batched-async replay strategies with
//! the divan benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```
//!
//! Each benchmark replays a generated event log of independent
//! advertiser→publisher workflows (deposit, create, accept, placement).
//! Logs are generated once into the system temp directory.

use linkmarket_engine::cli::StrategyType;
use linkmarket_engine::strategy::{create_strategy, BatchConfig};
use linkmarket_engine::CommissionPolicy;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn main() {
    divan::main();
}

fn generate_log(workflows: usize) -> String {
    let mut log =
        String::from("event,request,account,counterparty,amount,mode,reference,url\n");
    for i in 0..workflows {
        let advertiser = i * 2 + 1;
        log.push_str(&format!(
            "deposit,,{},,1000,paypal,bench-{},\n",
            advertiser, i
        ));
    }
    for i in 0..workflows {
        let request = i + 1;
        let advertiser = i * 2 + 1;
        let publisher = i * 2 + 2;
        log.push_str(&format!(
            "create_request,{},{},{},500,existing,listing-{},https://shop.example/\n",
            request, advertiser, publisher, request
        ));
        log.push_str(&format!("accept,{},,,,,,\n", request));
        log.push_str(&format!(
            "submit_placement,{},,,,,,https://blog.example/p\n",
            request
        ));
    }
    log
}

fn fixture(workflows: usize, name: &str, cell: &'static OnceLock<PathBuf>) -> &'static Path {
    cell.get_or_init(|| {
        let path = std::env::temp_dir().join(format!("linkmarket-bench-{}.csv", name));
        std::fs::write(&path, generate_log(workflows)).expect("write bench fixture");
        path
    })
}

static SMALL: OnceLock<PathBuf> = OnceLock::new();
static MEDIUM: OnceLock<PathBuf> = OnceLock::new();
static LARGE: OnceLock<PathBuf> = OnceLock::new();

fn run(strategy_type: StrategyType, path: &Path) {
    let config = matches!(strategy_type, StrategyType::Async).then(BatchConfig::default);
    let strategy = create_strategy(strategy_type, config, CommissionPolicy::default());
    let mut output = Vec::new();
    strategy.process(path, &mut output).expect("replay failed");
}

/// Small log: 25 workflows (100 events)
#[divan::bench]
fn sync_replay_small() {
    run(StrategyType::Sync, fixture(25, "small", &SMALL));
}

#[divan::bench]
fn async_replay_small() {
    run(StrategyType::Async, fixture(25, "small", &SMALL));
}

/// Medium log: 250 workflows (1,000 events)
#[divan::bench]
fn sync_replay_medium() {
    run(StrategyType::Sync, fixture(250, "medium", &MEDIUM));
}

#[divan::bench]
fn async_replay_medium() {
    run(StrategyType::Async, fixture(250, "medium", &MEDIUM));
}

/// Large log: 25,000 workflows (100,000 events)
#[divan::bench(sample_count = 5)]
fn sync_replay_large() {
    run(StrategyType::Sync, fixture(25_000, "large", &LARGE));
}

#[divan::bench(sample_count = 5)]
fn async_replay_large() {
    run(StrategyType::Async, fixture(25_000, "large", &LARGE));
}
