//! Thread-safe settlement components
//!
//! Concurrent counterparts of the single-threaded core, for workloads
//! where advertisers, publishers, and arbitrators act in parallel:
//! - `ledger_book` - per-account mutexes over a sharded map
//! - `request_store` - compare-and-swap status transitions
//! - `dispute_store` - atomic single-active-dispute enforcement
//! - `engine` - orchestration with a fixed lock order
//! - `batch_processor` - partitioned parallel replay

pub mod batch_processor;
pub mod dispute_store;
pub mod engine;
pub mod ledger_book;
pub mod request_store;

pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use dispute_store::AsyncDisputeStore;
pub use engine::AsyncSettlementEngine;
pub use ledger_book::AsyncLedgerBook;
pub use request_store::AsyncRequestStore;
