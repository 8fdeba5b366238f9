//! Processing strategy module for event-log replay
//!
//! This module defines the Strategy pattern for complete replay
//! pipelines, encompassing CSV parsing, settlement processing, and
//! balance output. This allows different processing implementations
//! (synchronous, asynchronous batch) to be selected at runtime.

use crate::cli::StrategyType;
use crate::core::CommissionPolicy;
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncReplayStrategy, BatchConfig};
pub use sync::SyncReplayStrategy;

/// Processing strategy trait for complete replay pipelines
///
/// Each strategy reads marketplace events from a CSV log, drives them
/// through a settlement engine, and writes the final account balances
/// to the output.
pub trait ProcessingStrategy: Send + Sync {
    /// Replay events from the input log and write balances to output
    ///
    /// # Errors
    ///
    /// Returns an error string only for fatal problems (file not found,
    /// I/O failure). Individual event rejections are logged and replay
    /// continues with the next event.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Create a processing strategy
///
/// Factory selecting the implementation at runtime from the CLI
/// strategy type, batch configuration (async only), and commission
/// policy.
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
    policy: CommissionPolicy,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncReplayStrategy::new(policy)),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncReplayStrategy::new(config, policy))
        }
    }
}
