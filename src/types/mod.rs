//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: account identifiers and balance snapshots
//! - `ledger`: immutable ledger entries
//! - `request`: purchase-request lifecycle types
//! - `dispute`: dispute lifecycle and resolution types
//! - `event`: replayable marketplace events
//! - `error`: error types for the settlement engine

pub mod account;
pub mod dispute;
pub mod error;
pub mod event;
pub mod ledger;
pub mod request;

pub use account::{AccountId, BalanceSnapshot, PLATFORM_ACCOUNT};
pub use dispute::{
    Dispute, DisputeId, DisputeMessage, DisputeStatus, ResolutionKind, ResolutionOutcome,
    ReversalOutcome,
};
pub use error::MarketError;
pub use event::EventRecord;
pub use ledger::{EntryDirection, EntryId, EntryKind, LedgerEntry};
pub use request::{
    Article, ArticleStage, ContentMode, NewRequest, PurchaseRequest, RequestId, RequestStatus,
};
