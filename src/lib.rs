//! Backlink Marketplace Settlement Engine
//!
//! # Overview
//!
//! This library implements the settlement core of a backlink
//! marketplace: the purchase-request state machine, the append-only
//! monetary ledger, the commission rule, and the dispute-driven
//! compensation path. A CSV replay front-end drives the core from a
//! marketplace event log, with both a synchronous and a batched parallel
//! strategy.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (ledger entries, purchase requests, disputes)
//! - [`cli`] - CLI argument parsing
//! - [`core`] - Business logic components:
//!   - [`core::ledger_book`] - Append-only ledger with cached balances
//!   - [`core::commission`] - Pure commission split calculations
//!   - [`core::engine`] - The settlement engine owning every lifecycle transition
//!   - [`core::dispute_store`] - Dispute lifecycle and message threads
//! - [`io`] - Event-log I/O with pluggable parsing strategies
//! - [`strategy`] - Sync and async replay pipelines
//!
//! # Purchase-Request Lifecycle
//!
//! A request starts `pending` when the advertiser creates it. The
//! publisher accepts (branching on content mode), rejects, or the
//! advertiser cancels. On placement confirmation the engine debits the
//! advertiser and splits the price into publisher commission and
//! platform fee — exactly once, no matter how often the confirmation is
//! retried. Funds collected from the advertiser are not released to the
//! publisher until placement is confirmed.
//!
//! # Disputes
//!
//! Either party can dispute an accepted or completed request; at most
//! one dispute is active per request. An arbitrator's resolution is
//! terminal and feeds back into the ledger: full refunds reverse a
//! posted commission (flagging a shortfall if the publisher has since
//! withdrawn), partial refunds and compensation credit a fixed amount,
//! replacements and dismissals move no money.
//!
//! # Invariants
//!
//! - A cached balance always equals the sum of the account's ledger
//!   entries; ledger entries are never mutated or deleted.
//! - No balance goes negative; a debit that would breach this fails and
//!   changes nothing.
//! - Commission splits are exact: publisher share plus platform fee
//!   equals the price, with no rounding leakage.

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use crate::core::{
    AsyncSettlementEngine, BatchProcessor, CommissionPolicy, LedgerBook, SettlementEngine,
};
pub use io::write_balances_csv;
pub use types::{
    AccountId, BalanceSnapshot, Dispute, DisputeId, EventRecord, LedgerEntry, MarketError,
    PurchaseRequest, RequestId, RequestStatus, PLATFORM_ACCOUNT,
};
