//! Thread-safe ledger with per-account serialization
//!
//! This module provides the `AsyncLedgerBook`, the concurrent counterpart
//! of [`crate::core::ledger_book::LedgerBook`]. Each account's entries
//! and cached balance live behind their own mutex inside a sharded map,
//! so operations on different accounts never contend.
//!
//! # Lock discipline
//!
//! - Single-account operations lock only that account.
//! - Multi-account operations (transfer, settlement) first clone the
//!   `Arc` handles out of the map (releasing the map guards), then lock
//!   the mutexes in ascending account-id order. One global order means
//!   two concurrent multi-account operations can never deadlock.
//! - All balance checks happen under the same locks as the writes, so
//!   two debits racing for the last funds cannot both pass the
//!   insufficient-funds check.

use crate::core::commission::SettlementSplit;
use crate::core::ledger_book::{AccountLedger, SettlementEntries};
use crate::types::{
    AccountId, BalanceSnapshot, EntryDirection, EntryId, EntryKind, LedgerEntry, MarketError,
    RequestId, PLATFORM_ACCOUNT,
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Thread-safe append-only ledger with cached balances
pub struct AsyncLedgerBook {
    accounts: DashMap<AccountId, Arc<Mutex<AccountLedger>>>,
    next_entry: AtomicU64,
}

fn lock(ledger: &Mutex<AccountLedger>) -> MutexGuard<'_, AccountLedger> {
    // A poisoned account lock only means another thread panicked while
    // holding it; the ledger data itself is still append-consistent
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AsyncLedgerBook {
    /// Create an empty ledger book
    pub fn new() -> Self {
        AsyncLedgerBook {
            accounts: DashMap::new(),
            next_entry: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> EntryId {
        self.next_entry.fetch_add(1, Ordering::Relaxed)
    }

    /// Get or create the account's handle; the map guard is released
    /// before the caller locks the mutex
    fn handle(&self, account: AccountId) -> Arc<Mutex<AccountLedger>> {
        Arc::clone(
            self.accounts
                .entry(account)
                .or_insert_with(|| Arc::new(Mutex::new(AccountLedger::new(account))))
                .value(),
        )
    }

    /// The account's handle if it has ever been touched
    fn existing_handle(&self, account: AccountId) -> Option<Arc<Mutex<AccountLedger>>> {
        self.accounts
            .get(&account)
            .map(|entry| Arc::clone(entry.value()))
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

    fn append(
        &self,
        ledger: &mut AccountLedger,
        kind: EntryKind,
        direction: EntryDirection,
        amount: Decimal,
        description: String,
        request: Option<RequestId>,
    ) -> EntryId {
        let id = self.next_id();
        ledger.entries.push(LedgerEntry {
            id,
            account: ledger.account,
            kind,
            direction,
            amount,
            description,
            request,
            created_at: Utc::now(),
        });
        id
    }

    /// Append a credit entry and raise the cached balance
    pub fn credit(
        &self,
        account: AccountId,
        amount: Decimal,
        kind: EntryKind,
        description: impl Into<String>,
        request: Option<RequestId>,
    ) -> Result<EntryId, MarketError> {
        Self::require_positive(amount)?;

        let handle = self.handle(account);
        let mut ledger = lock(&handle);
        let new_balance = ledger
            .balance
            .checked_add(amount)
            .ok_or_else(|| MarketError::arithmetic_overflow("credit", account))?;

        ledger.balance = new_balance;
        let id = self.append(
            &mut ledger,
            kind,
            EntryDirection::Credit,
            amount,
            description.into(),
            request,
        );
        Ok(id)
    }

    /// Append a debit entry and lower the cached balance
    ///
    /// The insufficient-funds check runs under the account lock, so
    /// concurrent debits are serialized and at most the funded ones
    /// succeed. A failed debit does not materialize an untouched account.
    pub fn debit(
        &self,
        account: AccountId,
        amount: Decimal,
        kind: EntryKind,
        description: impl Into<String>,
        request: Option<RequestId>,
    ) -> Result<EntryId, MarketError> {
        Self::require_positive(amount)?;

        let Some(handle) = self.existing_handle(account) else {
            return Err(MarketError::insufficient_funds(
                account,
                Decimal::ZERO,
                amount,
            ));
        };
        let mut ledger = lock(&handle);
        if ledger.balance < amount {
            return Err(MarketError::insufficient_funds(
                account,
                ledger.balance,
                amount,
            ));
        }

        let new_balance = ledger
            .balance
            .checked_sub(amount)
            .ok_or_else(|| MarketError::arithmetic_overflow("debit", account))?;

        ledger.balance = new_balance;
        let id = self.append(
            &mut ledger,
            kind,
            EntryDirection::Debit,
            amount,
            description.into(),
            request,
        );
        Ok(id)
    }

    /// Compose a debit and a credit as one atomic unit
    ///
    /// Both accounts stay locked for the whole operation, in ascending
    /// account-id order, so no observer sees the money in flight and
    /// concurrent transfers cannot deadlock.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        kinds: (EntryKind, EntryKind),
        description: impl Into<String>,
        request: Option<RequestId>,
    ) -> Result<(EntryId, EntryId), MarketError> {
        Self::require_positive(amount)?;
        if from == to {
            return Err(MarketError::validation(
                "transfer endpoints must be different accounts",
            ));
        }

        let Some(from_handle) = self.existing_handle(from) else {
            return Err(MarketError::insufficient_funds(from, Decimal::ZERO, amount));
        };
        let to_handle = self.handle(to);

        let (mut from_ledger, mut to_ledger) = if from < to {
            let f = lock(&from_handle);
            let t = lock(&to_handle);
            (f, t)
        } else {
            let t = lock(&to_handle);
            let f = lock(&from_handle);
            (f, t)
        };

        if from_ledger.balance < amount {
            return Err(MarketError::insufficient_funds(
                from,
                from_ledger.balance,
                amount,
            ));
        }
        let new_from = from_ledger
            .balance
            .checked_sub(amount)
            .ok_or_else(|| MarketError::arithmetic_overflow("transfer", from))?;
        let new_to = to_ledger
            .balance
            .checked_add(amount)
            .ok_or_else(|| MarketError::arithmetic_overflow("transfer", to))?;

        let description = description.into();
        from_ledger.balance = new_from;
        let debit = self.append(
            &mut from_ledger,
            kinds.0,
            EntryDirection::Debit,
            amount,
            description.clone(),
            request,
        );
        to_ledger.balance = new_to;
        let credit = self.append(
            &mut to_ledger,
            kinds.1,
            EntryDirection::Credit,
            amount,
            description,
            request,
        );
        Ok((debit, credit))
    }

    /// Post the full settlement of a confirmed placement
    ///
    /// Locks the advertiser, publisher, and platform accounts in
    /// ascending id order and applies the debit and both credits as one
    /// unit: every new balance is computed with checked arithmetic before
    /// any of them is written, so a failure leaves all three accounts
    /// untouched.
    pub fn post_settlement(
        &self,
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

        let Some(advertiser_handle) = self.existing_handle(advertiser) else {
            return Err(MarketError::insufficient_funds(
                advertiser,
                Decimal::ZERO,
                price,
            ));
        };
        let mut handles = vec![
            (advertiser, advertiser_handle),
            (publisher, self.handle(publisher)),
            (PLATFORM_ACCOUNT, self.handle(PLATFORM_ACCOUNT)),
        ];
        handles.sort_by_key(|(id, _)| *id);

        let mut guards: Vec<(AccountId, MutexGuard<'_, AccountLedger>)> = handles
            .iter()
            .map(|(id, handle)| (*id, lock(handle)))
            .collect();

        let balance_of = |guards: &[(AccountId, MutexGuard<'_, AccountLedger>)],
                          id: AccountId| {
            guards
                .iter()
                .find(|(account, _)| *account == id)
                .map(|(_, guard)| guard.balance)
                .unwrap_or(Decimal::ZERO)
        };

        let advertiser_balance = balance_of(&guards, advertiser);
        if advertiser_balance < price {
            return Err(MarketError::insufficient_funds(
                advertiser,
                advertiser_balance,
                price,
            ));
        }
        let new_advertiser = advertiser_balance
            .checked_sub(price)
            .ok_or_else(|| MarketError::arithmetic_overflow("settlement", advertiser))?;
        let new_publisher = balance_of(&guards, publisher)
            .checked_add(split.publisher_share)
            .ok_or_else(|| MarketError::arithmetic_overflow("settlement", publisher))?;
        let new_platform = balance_of(&guards, PLATFORM_ACCOUNT)
            .checked_add(split.platform_fee)
            .ok_or_else(|| MarketError::arithmetic_overflow("settlement", PLATFORM_ACCOUNT))?;

        let mut purchase = 0;
        let mut publisher_commission = None;
        let mut platform_fee = None;
        for (id, guard) in guards.iter_mut() {
            if *id == advertiser {
                guard.balance = new_advertiser;
                purchase = self.append(
                    guard,
                    EntryKind::Purchase,
                    EntryDirection::Debit,
                    price,
                    format!("placement payment for request {}", request),
                    Some(request),
                );
            } else if *id == publisher {
                guard.balance = new_publisher;
                if split.publisher_share > Decimal::ZERO {
                    publisher_commission = Some(self.append(
                        guard,
                        EntryKind::Commission,
                        EntryDirection::Credit,
                        split.publisher_share,
                        format!("publisher commission for request {}", request),
                        Some(request),
                    ));
                }
            } else {
                guard.balance = new_platform;
                if split.platform_fee > Decimal::ZERO {
                    platform_fee = Some(self.append(
                        guard,
                        EntryKind::Commission,
                        EntryDirection::Credit,
                        split.platform_fee,
                        format!("platform fee for request {}", request),
                        Some(request),
                    ));
                }
            }
        }

        Ok(SettlementEntries {
            purchase,
            publisher_commission,
            platform_fee,
        })
    }

    /// Cached balance; zero for an account with no entries
    pub fn balance_of(&self, account: AccountId) -> Decimal {
        self.existing_handle(account)
            .map(|handle| lock(&handle).balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// Snapshot of the account's entries, oldest first
    pub fn entries_for(&self, account: AccountId) -> Vec<LedgerEntry> {
        self.existing_handle(account)
            .map(|handle| lock(&handle).entries.clone())
            .unwrap_or_default()
    }

    /// Check the cached balance against the ledger aggregate
    pub fn reconcile(&self, account: AccountId) -> bool {
        self.existing_handle(account)
            .map(|handle| {
                let ledger = lock(&handle);
                ledger.balance == ledger.aggregate()
            })
            .unwrap_or(true)
    }

    /// Accounts whose cache has drifted from the ledger aggregate
    pub fn reconcile_all(&self) -> Vec<AccountId> {
        let mut drifted: Vec<AccountId> = self
            .accounts
            .iter()
            .filter_map(|entry| {
                let ledger = lock(entry.value());
                (ledger.balance != ledger.aggregate()).then_some(ledger.account)
            })
            .collect();
        drifted.sort_unstable();
        drifted
    }

    /// Balance snapshots for every touched account, sorted by account id
    pub fn snapshots(&self) -> Vec<BalanceSnapshot> {
        let mut snapshots: Vec<BalanceSnapshot> = self
            .accounts
            .iter()
            .map(|entry| {
                let ledger = lock(entry.value());
                BalanceSnapshot {
                    account: ledger.account,
                    balance: ledger.balance,
                }
            })
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.account);
        snapshots
    }
}

impl Default for AsyncLedgerBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commission::CommissionPolicy;
    use std::thread;

    fn units(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn test_credit_and_debit() {
        let book = AsyncLedgerBook::new();

        book.credit(1, units(100), EntryKind::Deposit, "seed", None)
            .unwrap();
        book.debit(1, units(30), EntryKind::Withdrawal, "payout", None)
            .unwrap();

        assert_eq!(book.balance_of(1), units(70));
        assert_eq!(book.entries_for(1).len(), 2);
        assert!(book.reconcile(1));
    }

    #[test]
    fn test_debit_unknown_account_fails_without_materializing() {
        let book = AsyncLedgerBook::new();

        let result = book.debit(9, units(1), EntryKind::Withdrawal, "payout", None);

        assert!(matches!(result, Err(MarketError::InsufficientFunds { .. })));
        assert_eq!(book.snapshots().len(), 0);
    }

    #[test]
    fn test_transfer_to_self_rejected() {
        let book = AsyncLedgerBook::new();
        book.credit(1, units(100), EntryKind::Deposit, "seed", None)
            .unwrap();

        let result = book.transfer(
            1,
            1,
            units(10),
            (EntryKind::Purchase, EntryKind::Commission),
            "loop",
            None,
        );
        assert!(matches!(result, Err(MarketError::Validation { .. })));
    }

    #[test]
    fn test_concurrent_credits_sum_exactly() {
        let book = Arc::new(AsyncLedgerBook::new());
        let mut handles = vec![];

        for _ in 0..50 {
            let book = Arc::clone(&book);
            handles.push(thread::spawn(move || {
                book.credit(1, units(10), EntryKind::Deposit, "tick", None)
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(book.balance_of(1), units(500));
        assert_eq!(book.entries_for(1).len(), 50);
        assert!(book.reconcile(1));
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let book = Arc::new(AsyncLedgerBook::new());
        book.credit(1, units(100), EntryKind::Deposit, "seed", None)
            .unwrap();

        // 10 threads each try to take 60; only one can succeed
        let mut handles = vec![];
        for _ in 0..10 {
            let book = Arc::clone(&book);
            handles.push(thread::spawn(move || {
                book.debit(1, units(60), EntryKind::Withdrawal, "grab", None)
                    .is_ok()
            }));
        }
        let successes = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(book.balance_of(1), units(40));
        assert!(book.reconcile(1));
    }

    #[test]
    fn test_concurrent_transfers_opposite_directions_no_deadlock() {
        let book = Arc::new(AsyncLedgerBook::new());
        book.credit(1, units(1000), EntryKind::Deposit, "seed", None)
            .unwrap();
        book.credit(2, units(1000), EntryKind::Deposit, "seed", None)
            .unwrap();

        let mut handles = vec![];
        for i in 0..20 {
            let book = Arc::clone(&book);
            handles.push(thread::spawn(move || {
                let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
                book.transfer(
                    from,
                    to,
                    units(5),
                    (EntryKind::Purchase, EntryKind::Commission),
                    "ping-pong",
                    None,
                )
                .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Equal traffic both ways leaves the balances unchanged
        assert_eq!(book.balance_of(1), units(1000));
        assert_eq!(book.balance_of(2), units(1000));
        assert!(book.reconcile_all().is_empty());
    }

    #[test]
    fn test_concurrent_settlements_share_advertiser() {
        let book = Arc::new(AsyncLedgerBook::new());
        book.credit(1, units(1000), EntryKind::Deposit, "seed", None)
            .unwrap();
        let policy = CommissionPolicy::default();

        let mut handles = vec![];
        for request in 0..4u64 {
            let book = Arc::clone(&book);
            let split = policy.settlement_split(units(200));
            handles.push(thread::spawn(move || {
                book.post_settlement(1, 2 + request as AccountId, units(200), &split, request)
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(book.balance_of(1), units(200));
        assert_eq!(book.balance_of(PLATFORM_ACCOUNT), units(240));
        for publisher in 2..6 {
            assert_eq!(book.balance_of(publisher), units(140));
        }
        assert!(book.reconcile_all().is_empty());
    }

    #[test]
    fn test_settlement_insufficient_funds_touches_nothing() {
        let book = AsyncLedgerBook::new();
        book.credit(1, units(100), EntryKind::Deposit, "seed", None)
            .unwrap();

        let split = CommissionPolicy::default().settlement_split(units(500));
        let result = book.post_settlement(1, 2, units(500), &split, 1);

        assert!(matches!(result, Err(MarketError::InsufficientFunds { .. })));
        assert_eq!(book.balance_of(1), units(100));
        assert_eq!(book.balance_of(2), Decimal::ZERO);
    }
}
