//! Append-only ledger with cached balances
//!
//! This module provides the `LedgerBook`, the combined ledger store and
//! balance service. Every balance-affecting operation appends an immutable
//! [`LedgerEntry`] and updates a cached running balance for the account.
//! The cache is a projection: the ledger aggregate is the source of truth,
//! and [`LedgerBook::reconcile`] checks the two against each other.
//!
//! # Invariants
//!
//! - No account balance ever goes negative as the result of an operation;
//!   a debit that would breach this fails with `InsufficientFunds` and
//!   changes nothing.
//! - Entries are never mutated or deleted; corrections are new offsetting
//!   entries.
//! - Every operation is all-or-nothing: validation happens before the
//!   first append, so a failed operation leaves no partial entry.

use crate::core::commission::SettlementSplit;
use crate::types::{
    AccountId, BalanceSnapshot, EntryDirection, EntryId, EntryKind, LedgerEntry, MarketError,
    RequestId, PLATFORM_ACCOUNT,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One account's slice of the ledger: its entries plus the cached balance
#[derive(Debug, Clone, PartialEq)]
pub struct AccountLedger {
    /// The account these entries belong to
    pub account: AccountId,

    /// Cached running balance; always equals the entry aggregate
    pub balance: Decimal,

    /// Append-only entry history, oldest first
    pub entries: Vec<LedgerEntry>,
}

impl AccountLedger {
    /// Empty ledger for a fresh account
    pub fn new(account: AccountId) -> Self {
        AccountLedger {
            account,
            balance: Decimal::ZERO,
            entries: Vec::new(),
        }
    }

    /// Recompute the balance from scratch
    pub fn aggregate(&self) -> Decimal {
        self.entries.iter().map(LedgerEntry::signed_amount).sum()
    }
}

/// Ledger ids handed back by a placement settlement
///
/// The credit sides are optional because a split can leave one side at
/// zero (a one-unit price rounds the whole amount to the publisher);
/// zero-amount entries are never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementEntries {
    /// Advertiser debit for the full price
    pub purchase: EntryId,

    /// Publisher commission credit
    pub publisher_commission: Option<EntryId>,

    /// Platform fee credit
    pub platform_fee: Option<EntryId>,
}

/// Combined ledger store and balance service
///
/// Single-threaded variant; operations take `&mut self`, so per-account
/// serialization is structural. The `core::async` module holds the
/// concurrent counterpart.
pub struct LedgerBook {
    accounts: HashMap<AccountId, AccountLedger>,
    next_entry: EntryId,
}

impl LedgerBook {
    /// Create an empty ledger book
    pub fn new() -> Self {
        LedgerBook {
            accounts: HashMap::new(),
            next_entry: 1,
        }
    }

    fn account_mut(&mut self, account: AccountId) -> &mut AccountLedger {
        self.accounts
            .entry(account)
            .or_insert_with(|| AccountLedger::new(account))
    }

    fn next_id(&mut self) -> EntryId {
        let id = self.next_entry;
        self.next_entry += 1;
        id
    }

    fn require_positive(amount: Decimal) -> Result<(), MarketError> {
        if amount <= Decimal::ZERO {
            return Err(MarketError::validation(format!(
                "amount must be positive, got {}",
                amount
            )));
        }
        Ok(())
    }

    /// Append a credit entry and raise the cached balance
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive amount and
    /// `ArithmeticOverflow` if the balance cannot absorb the credit.
    pub fn credit(
        &mut self,
        account: AccountId,
        amount: Decimal,
        kind: EntryKind,
        description: impl Into<String>,
        request: Option<RequestId>,
    ) -> Result<EntryId, MarketError> {
        Self::require_positive(amount)?;

        let id = self.next_id();
        let ledger = self.account_mut(account);
        let new_balance = ledger
            .balance
            .checked_add(amount)
            .ok_or_else(|| MarketError::arithmetic_overflow("credit", account))?;

        ledger.balance = new_balance;
        ledger.entries.push(LedgerEntry {
            id,
            account,
            kind,
            direction: EntryDirection::Credit,
            amount,
            description: description.into(),
            request,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    /// Append a debit entry and lower the cached balance
    ///
    /// The insufficient-funds check and the append are a single unit with
    /// respect to other operations on this book (`&mut self`).
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-positive amount and
    /// `InsufficientFunds` if the debit would take the balance below zero;
    /// in both cases the account is unchanged.
    pub fn debit(
        &mut self,
        account: AccountId,
        amount: Decimal,
        kind: EntryKind,
        description: impl Into<String>,
        request: Option<RequestId>,
    ) -> Result<EntryId, MarketError> {
        Self::require_positive(amount)?;

        let balance = self.balance_of(account);
        if balance < amount {
            return Err(MarketError::insufficient_funds(account, balance, amount));
        }

        let id = self.next_id();
        let ledger = self.account_mut(account);
        let new_balance = ledger
            .balance
            .checked_sub(amount)
            .ok_or_else(|| MarketError::arithmetic_overflow("debit", account))?;

        ledger.balance = new_balance;
        ledger.entries.push(LedgerEntry {
            id,
            account,
            kind,
            direction: EntryDirection::Debit,
            amount,
            description: description.into(),
            request,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    /// Compose a debit and a credit as one atomic unit
    ///
    /// The debit side is validated before either entry is appended, so a
    /// failed transfer changes neither account.
    pub fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        kinds: (EntryKind, EntryKind),
        description: impl Into<String>,
        request: Option<RequestId>,
    ) -> Result<(EntryId, EntryId), MarketError> {
        Self::require_positive(amount)?;

        let balance = self.balance_of(from);
        if balance < amount {
            return Err(MarketError::insufficient_funds(from, balance, amount));
        }

        if self.balance_of(to).checked_add(amount).is_none() {
            return Err(MarketError::arithmetic_overflow("transfer", to));
        }

        let description = description.into();
        let debit = self.debit(from, amount, kinds.0, description.clone(), request)?;
        let credit = self.credit(to, amount, kinds.1, description, request)?;
        Ok((debit, credit))
    }

    /// Post the full settlement of a confirmed placement
    ///
    /// Debits the advertiser the full price and credits the publisher
    /// share and platform fee computed by the commission calculator. The
    /// advertiser balance is validated up front, so the three entries are
    /// posted all-or-nothing.
    pub fn post_settlement(
        &mut self,
        advertiser: AccountId,
        publisher: AccountId,
        price: Decimal,
        split: &SettlementSplit,
        request: RequestId,
    ) -> Result<SettlementEntries, MarketError> {
        Self::require_positive(price)?;
        if advertiser == publisher
            || advertiser == PLATFORM_ACCOUNT
            || publisher == PLATFORM_ACCOUNT
        {
            return Err(MarketError::validation(
                "settlement requires three distinct accounts",
            ));
        }

        let balance = self.balance_of(advertiser);
        if balance < price {
            return Err(MarketError::insufficient_funds(advertiser, balance, price));
        }

        let purchase = self.debit(
            advertiser,
            price,
            EntryKind::Purchase,
            format!("placement payment for request {}", request),
            Some(request),
        )?;
        let publisher_commission = if split.publisher_share > Decimal::ZERO {
            Some(self.credit(
                publisher,
                split.publisher_share,
                EntryKind::Commission,
                format!("publisher commission for request {}", request),
                Some(request),
            )?)
        } else {
            None
        };
        let platform_fee = if split.platform_fee > Decimal::ZERO {
            Some(self.credit(
                PLATFORM_ACCOUNT,
                split.platform_fee,
                EntryKind::Commission,
                format!("platform fee for request {}", request),
                Some(request),
            )?)
        } else {
            None
        };

        Ok(SettlementEntries {
            purchase,
            publisher_commission,
            platform_fee,
        })
    }

    /// Cached balance; zero for an account with no entries
    pub fn balance_of(&self, account: AccountId) -> Decimal {
        self.accounts
            .get(&account)
            .map(|ledger| ledger.balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// All entries for an account, oldest first
    pub fn entries_for(&self, account: AccountId) -> &[LedgerEntry] {
        self.accounts
            .get(&account)
            .map(|ledger| ledger.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Check the cached balance against the ledger aggregate
    ///
    /// Returns `true` when they agree (an unknown account trivially
    /// agrees at zero).
    pub fn reconcile(&self, account: AccountId) -> bool {
        self.accounts
            .get(&account)
            .map(|ledger| ledger.balance == ledger.aggregate())
            .unwrap_or(true)
    }

    /// Accounts whose cache has drifted from the ledger aggregate
    pub fn reconcile_all(&self) -> Vec<AccountId> {
        let mut drifted: Vec<AccountId> = self
            .accounts
            .values()
            .filter(|ledger| ledger.balance != ledger.aggregate())
            .map(|ledger| ledger.account)
            .collect();
        drifted.sort_unstable();
        drifted
    }

    /// Balance snapshots for every touched account, sorted by account id
    pub fn snapshots(&self) -> Vec<BalanceSnapshot> {
        let mut snapshots: Vec<BalanceSnapshot> = self
            .accounts
            .values()
            .map(|ledger| BalanceSnapshot {
                account: ledger.account,
                balance: ledger.balance,
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.account);
        snapshots
    }
}

impl Default for LedgerBook {
    fn default() -> Self {
        Self::new()
    }
}
