//! Asynchronous batch replay strategy
//!
//! Multi-threaded implementation of the ProcessingStrategy trait. It
//! reads the event log in batches and fans each batch out across tokio
//! tasks via the [`BatchProcessor`].
//!
//! # Architecture
//!
//! ```text
//! AsyncReplayStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── BatchProcessor (run/partition scheduling)
//!     └── AsyncSettlementEngine (thread-safe settlement core)
//! ```
//!
//! Batches are processed sequentially — each completes before the next
//! is read — so per-entity ordering holds across the whole log. Within a
//! batch, independent workflows process in parallel.

use crate::core::r#async::{AsyncSettlementEngine, BatchProcessor};
use crate::core::CommissionPolicy;
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_balances_csv;
use crate::strategy::ProcessingStrategy;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Configuration for batch replay
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of events per batch
    pub batch_size: usize,
    /// Worker threads for the tokio runtime
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
    /// Create a config, falling back to defaults for zero values
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                "Invalid batch_size (0), using default ({})",
                default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                "Invalid max_concurrent_batches (0), using default ({})",
                default.max_concurrent_batches
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

/// Asynchronous batch replay strategy
#[derive(Debug, Clone)]
pub struct AsyncReplayStrategy {
    config: BatchConfig,
    policy: CommissionPolicy,
}

impl AsyncReplayStrategy {
    /// Create a strategy with the given batch configuration and
    /// commission policy
    pub fn new(config: BatchConfig, policy: CommissionPolicy) -> Self {
        Self { config, policy }
    }
}

impl ProcessingStrategy for AsyncReplayStrategy {
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let engine = Arc::new(AsyncSettlementEngine::new(self.policy));
            let processor = BatchProcessor::new(Arc::clone(&engine));

            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;

            // Wrap the tokio file for csv-async's futures-io interface
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            // Batches run sequentially so entity ordering holds across
            // the whole log; parallelism lives inside each batch
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }
                let _results = processor.process_batch(batch).await;
            }

            write_balances_csv(&engine.snapshots(), output)?;
            Ok(())
        })
    }
}
