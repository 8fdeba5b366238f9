//! Core business logic module
//!
//! This module contains the settlement core:
//! - `commission` - pure commission split calculations
//! - `ledger_book` - append-only ledger with cached balances
//! - `request_store` - purchase-request rows and guarded transitions
//! - `dispute_store` - disputes, threads, single-active invariant
//! - `engine` - single-threaded orchestration of all operations
//! - `notify` - outbound lifecycle notification sinks
//! - `async` - thread-safe variants for concurrent callers

pub mod commission;
pub mod dispute_store;
pub mod engine;
pub mod ledger_book;
pub mod notify;
pub mod request_store;
pub mod r#async;

pub use commission::{CommissionPolicy, DepositSplit, SettlementSplit};
pub use dispute_store::DisputeStore;
pub use engine::SettlementEngine;
pub use ledger_book::{AccountLedger, LedgerBook, SettlementEntries};
pub use notify::{FailingSink, LifecycleSink, Notification, NullSink, RecordingSink};
pub use r#async::{
    AsyncDisputeStore, AsyncLedgerBook, AsyncRequestStore, AsyncSettlementEngine, BatchProcessor,
};
pub use request_store::RequestStore;
