//! Synchronous replay strategy
//!
//! Single-threaded implementation of the ProcessingStrategy trait. It
//! orchestrates replay by coordinating the SyncReader (event input), the
//! SettlementEngine (business logic), and csv_format (balance output).
//!
//! Memory usage stays constant in the log length: events stream one at a
//! time, and only accounts, requests, and disputes are held in memory.

use crate::core::{CommissionPolicy, SettlementEngine};
use crate::io::csv_format::write_balances_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::ProcessingStrategy;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Synchronous replay strategy
///
/// Processes the whole log on the calling thread, in log order. This is
/// the reference behavior the batch strategy must match for
/// conflict-free logs.
#[derive(Debug, Clone, Copy)]
pub struct SyncReplayStrategy {
    policy: CommissionPolicy,
}

impl SyncReplayStrategy {
    /// Create a strategy with the given commission policy
    pub fn new(policy: CommissionPolicy) -> Self {
        SyncReplayStrategy { policy }
    }
}

impl ProcessingStrategy for SyncReplayStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let mut engine = SettlementEngine::with_policy(self.policy);
        let reader = SyncReader::new(input_path)?;

        for result in reader {
            match result {
                Ok(event) => {
                    // Rejected events are logged; replay continues
                    if let Err(e) = engine.process(event) {
                        warn!("Event rejected: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Event log parse error: {}", e);
                }
            }
        }

        write_balances_csv(&engine.snapshots(), output)?;
        Ok(())
    }
}
