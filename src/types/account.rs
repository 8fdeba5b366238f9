//! Account identifiers and balance read models
//!
//! Accounts hold no stored balance as source of truth; the balance is
//! derived from the ledger, with a cached running total maintained by the
//! ledger book for fast reads (see [`crate::core::ledger_book`]).

use rust_decimal::Decimal;

/// Account identifier
///
/// One account per marketplace user (advertiser or publisher), plus the
/// reserved platform account.
pub type AccountId = u32;

/// Reserved account that collects deposit fees and platform commission
/// shares.
///
/// Account id 0 is never handed out to a marketplace user.
pub const PLATFORM_ACCOUNT: AccountId = 0;

/// Point-in-time balance of a single account
///
/// This is the read model emitted by replay output and balance queries.
/// The balance equals the sum of the account's ledger entries at the time
/// of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    /// The account this snapshot describes
    pub account: AccountId,

    /// Cached running balance, reconciled against the ledger aggregate
    pub balance: Decimal,
}
