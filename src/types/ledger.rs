//! Immutable ledger entries
//!
//! Every balance-affecting operation appends a [`LedgerEntry`]; entries are
//! never mutated or deleted. Corrections are new offsetting entries, which
//! preserves a full audit trail of every account's history.

use super::account::AccountId;
use super::request::RequestId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger entry identifier, unique across all accounts
pub type EntryId = u64;

/// Business meaning of a ledger entry
///
/// The kind labels why money moved; the direction says which way. Most
/// kinds have a natural direction (a `Purchase` debits the advertiser, a
/// `Commission` credits the publisher or platform), but offsetting
/// corrections reuse the kind of the entry they reverse, so the direction
/// is stored explicitly rather than implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Funds received from an external payment collector (net of the
    /// deposit fee)
    Deposit,

    /// Funds paid out of the marketplace to the account owner
    Withdrawal,

    /// Advertiser payment for a confirmed placement
    Purchase,

    /// Publisher share or platform fee from a settlement or deposit
    Commission,

    /// Dispute-driven refund or compensation, or the offsetting reversal
    /// of a previously posted commission
    Refund,
}

impl EntryKind {
    /// Lowercase wire name, as used in replay logs and descriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::Purchase => "purchase",
            EntryKind::Commission => "commission",
            EntryKind::Refund => "refund",
        }
    }
}

/// Whether an entry adds to or subtracts from the account balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Credit,
    Debit,
}

/// One immutable, balance-affecting record
///
/// Created only by the ledger book; `amount` is always positive, with the
/// direction carried separately. An account's balance is the sum of
/// `signed_amount()` over its entries.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// Unique entry id (monotonic across the whole ledger)
    pub id: EntryId,

    /// The account whose balance this entry affects
    pub account: AccountId,

    /// Business meaning of the movement
    pub kind: EntryKind,

    /// Direction of the movement
    pub direction: EntryDirection,

    /// Positive amount moved
    pub amount: Decimal,

    /// Human-readable context for the audit trail
    pub description: String,

    /// Purchase request this entry settles, refunds, or reverses, if any
    pub request: Option<RequestId>,

    /// UTC creation time
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// The entry's contribution to the account balance
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            EntryDirection::Credit => self.amount,
            EntryDirection::Debit => -self.amount,
        }
    }
}
