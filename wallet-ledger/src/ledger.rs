//! In-memory ledger store
//!
//! The store is the single authority for account state. Every operation,
//! reads included, is serialized through one lock over the whole account
//! registry. Stats are updated while that lock is held, so the lock order is
//! always accounts first, then stats.
//!
//! # Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use wallet_ledger::{AccountId, DepositId, LedgerStore};
//!
//! let store = LedgerStore::new();
//! store.create_account(AccountId(1), Decimal::from(100)).unwrap();
//! let balance = store
//!     .apply_deposit(AccountId(1), DepositId(10), Decimal::from(50))
//!     .unwrap();
//! assert_eq!(balance, Decimal::from(150));
//! ```

use crate::{
    stats::StatAggregator,
    types::{
        Account, AccountId, AccountRecord, AccountSnapshot, Deposit, DepositId, DirtyFlags,
        Transaction, TransactionId, TransactionKind,
    },
    Error, Result,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Authoritative account registry
#[derive(Debug, Default)]
pub struct LedgerStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
    stats: StatAggregator,
}

/// Balance captured for write-back
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBalance {
    /// Balance at snapshot time
    pub balance: Decimal,
    /// Account revision at snapshot time
    pub revision: u64,
}

/// Unsynced units of one account, copied out under the registry lock
#[derive(Debug, Clone)]
pub struct PendingAccount {
    /// Account ID
    pub id: AccountId,
    /// Full record, if the account was never persisted
    pub insert: Option<AccountRecord>,
    /// Balance, if it changed since the last sync
    pub balance: Option<PendingBalance>,
    /// Unsynced deposits with their history index, in apply order
    pub deposits: Vec<(usize, Deposit)>,
    /// Unsynced transactions with their history index, in apply order
    pub transactions: Vec<(usize, Transaction)>,
}

impl PendingAccount {
    /// Number of gateway writes this account needs
    pub fn unit_count(&self) -> usize {
        self.insert.is_some() as usize
            + self.balance.is_some() as usize
            + self.deposits.len()
            + self.transactions.len()
    }
}

impl LedgerStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new account
    pub fn create_account(&self, id: AccountId, initial_balance: Decimal) -> Result<()> {
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&id) {
            return Err(Error::DuplicateAccount(id));
        }
        accounts.insert(id, Account::new(id, initial_balance));

        tracing::info!(account_id = %id, balance = %initial_balance, "Account created");
        Ok(())
    }

    /// Balance and stats of an account
    pub fn get_account(&self, id: AccountId) -> Result<AccountSnapshot> {
        let accounts = self.accounts.lock();
        let account = accounts.get(&id).ok_or(Error::AccountNotFound(id))?;

        Ok(AccountSnapshot {
            id,
            balance: account.balance(),
            stat: self.stats.get_stat(id),
        })
    }

    /// Apply a deposit and return the new balance
    pub fn apply_deposit(
        &self,
        account_id: AccountId,
        deposit_id: DepositId,
        amount: Decimal,
    ) -> Result<Decimal> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(&account_id)
            .ok_or(Error::AccountNotFound(account_id))?;

        if account.has_deposit(deposit_id) {
            return Err(Error::DuplicateDeposit {
                account_id,
                deposit_id,
            });
        }

        let balance_after = account
            .balance()
            .checked_add(amount)
            .ok_or(Error::AmountOverflow { account_id, amount })?;
        // Stat first: it either records fully or fails with nothing changed
        self.stats.record_deposit(account_id, amount)?;
        let balance = account.push_deposit(deposit_id, amount, balance_after);

        tracing::debug!(
            account_id = %account_id,
            deposit_id = %deposit_id,
            amount = %amount,
            balance = %balance,
            "Deposit applied"
        );

        Ok(balance)
    }

    /// Apply a bet or win and return the new balance
    pub fn apply_transaction(
        &self,
        account_id: AccountId,
        transaction_id: TransactionId,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<Decimal> {
        let mut accounts = self.accounts.lock();
        let account = accounts
            .get_mut(&account_id)
            .ok_or(Error::AccountNotFound(account_id))?;

        let balance_after = account
            .projected_balance(kind, amount)
            .ok_or(Error::AmountOverflow { account_id, amount })?;

        // Funds are checked before the ID, so a replayed oversized bet
        // reports InsufficientFunds
        if kind == TransactionKind::Bet && balance_after < Decimal::ZERO {
            return Err(Error::InsufficientFunds {
                balance: account.balance(),
                amount,
            });
        }

        if account.has_transaction(transaction_id) {
            return Err(Error::DuplicateTransaction {
                account_id,
                transaction_id,
            });
        }

        self.stats.record_transaction(account_id, kind, amount)?;
        let balance = account.push_transaction(transaction_id, kind, amount, balance_after);

        tracing::debug!(
            account_id = %account_id,
            transaction_id = %transaction_id,
            kind = %kind,
            amount = %amount,
            balance = %balance,
            "Transaction applied"
        );

        Ok(balance)
    }

    /// Copy of an account's deposit history
    pub fn deposits(&self, account_id: AccountId) -> Result<Vec<Deposit>> {
        let accounts = self.accounts.lock();
        let account = accounts
            .get(&account_id)
            .ok_or(Error::AccountNotFound(account_id))?;
        Ok(account.deposits().to_vec())
    }

    /// Copy of an account's transaction history
    pub fn transactions(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        let accounts = self.accounts.lock();
        let account = accounts
            .get(&account_id)
            .ok_or(Error::AccountNotFound(account_id))?;
        Ok(account.transactions().to_vec())
    }

    /// Stat registry fed by this store
    pub fn stats(&self) -> &StatAggregator {
        &self.stats
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.lock().len()
    }

    /// True if no account exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of units still waiting for write-back
    pub fn pending_units(&self) -> usize {
        let accounts = self.accounts.lock();
        accounts
            .values()
            .map(|account| {
                account.dirty.new as usize
                    + account.dirty.balance as usize
                    + account.deposits.iter().filter(|d| d.unsynced).count()
                    + account.transactions.iter().filter(|t| t.unsynced).count()
            })
            .sum()
    }

    /// Copy every dirty unit out of the registry.
    ///
    /// The lock is held only for the copy; gateway I/O happens on the result.
    pub fn collect_pending(&self) -> Vec<PendingAccount> {
        let accounts = self.accounts.lock();
        accounts
            .values()
            .filter(|account| !account.dirty.is_clean())
            .map(|account| PendingAccount {
                id: account.id,
                insert: account.dirty.new.then(|| account.record()),
                balance: account.dirty.balance.then(|| PendingBalance {
                    balance: account.balance,
                    revision: account.revision,
                }),
                deposits: if account.dirty.deposits {
                    account
                        .deposits
                        .iter()
                        .enumerate()
                        .filter(|(_, d)| d.unsynced)
                        .map(|(i, d)| (i, d.clone()))
                        .collect()
                } else {
                    Vec::new()
                },
                transactions: if account.dirty.transactions {
                    account
                        .transactions
                        .iter()
                        .enumerate()
                        .filter(|(_, t)| t.unsynced)
                        .map(|(i, t)| (i, t.clone()))
                        .collect()
                } else {
                    Vec::new()
                },
            })
            .collect()
    }

    /// Clear markers for units of `pending` that were written.
    ///
    /// The balance marker survives if the balance moved after the snapshot;
    /// history markers survive while any record of that history is unsynced.
    pub fn acknowledge(&self, pending: &PendingAccount) {
        let mut accounts = self.accounts.lock();
        let Some(account) = accounts.get_mut(&pending.id) else {
            return;
        };

        if pending.insert.is_some() {
            account.dirty.new = false;
        }

        if let Some(balance) = &pending.balance {
            if account.revision == balance.revision {
                account.dirty.balance = false;
            }
        }

        for (index, _) in &pending.deposits {
            if let Some(deposit) = account.deposits.get_mut(*index) {
                deposit.unsynced = false;
            }
        }
        if account.deposits.iter().all(|d| !d.unsynced) {
            account.dirty.deposits = false;
        }

        for (index, _) in &pending.transactions {
            if let Some(transaction) = account.transactions.get_mut(*index) {
                transaction.unsynced = false;
            }
        }
        if account.transactions.iter().all(|t| !t.unsynced) {
            account.dirty.transactions = false;
        }
    }

    /// Dirty markers of an account
    pub fn dirty_flags(&self, account_id: AccountId) -> Result<DirtyFlags> {
        let accounts = self.accounts.lock();
        accounts
            .get(&account_id)
            .map(|account| account.dirty())
            .ok_or(Error::AccountNotFound(account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    /// `n` × 10^27, near the top of the decimal range
    fn e27(n: i128) -> Decimal {
        Decimal::from_i128_with_scale(n * 10i128.pow(27), 0)
    }

    fn store_with_account(id: i64, balance: Decimal) -> LedgerStore {
        let store = LedgerStore::new();
        store.create_account(AccountId(id), balance).unwrap();
        store
    }

    #[test]
    fn test_create_duplicate_account() {
        let store = store_with_account(1, dec!(100));
        let result = store.create_account(AccountId(1), dec!(5));
        assert!(matches!(result, Err(Error::DuplicateAccount(AccountId(1)))));
        assert_eq!(store.get_account(AccountId(1)).unwrap().balance, dec!(100));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_account() {
        let store = LedgerStore::new();
        assert!(matches!(
            store.get_account(AccountId(9)),
            Err(Error::AccountNotFound(AccountId(9)))
        ));
    }

    #[test]
    fn test_settlement_scenario() {
        let store = store_with_account(1, dec!(100));

        let balance = store
            .apply_deposit(AccountId(1), DepositId(10), dec!(50))
            .unwrap();
        assert_eq!(balance, dec!(150));
        let stat = store.get_account(AccountId(1)).unwrap().stat;
        assert_eq!(stat.deposit_count, 1);
        assert_eq!(stat.deposit_sum, dec!(50));

        let rejected = store.apply_transaction(
            AccountId(1),
            TransactionId(20),
            TransactionKind::Bet,
            dec!(200),
        );
        assert!(matches!(rejected, Err(Error::InsufficientFunds { .. })));
        assert_eq!(store.get_account(AccountId(1)).unwrap().balance, dec!(150));

        let balance = store
            .apply_transaction(AccountId(1), TransactionId(21), TransactionKind::Win, dec!(30))
            .unwrap();
        assert_eq!(balance, dec!(180));
        let stat = store.get_account(AccountId(1)).unwrap().stat;
        assert_eq!(stat.win_count, 1);
        assert_eq!(stat.win_sum, dec!(30));
        assert_eq!(stat.bet_count, 0);

        let again = store.apply_deposit(AccountId(1), DepositId(10), dec!(50));
        assert!(matches!(again, Err(Error::DuplicateDeposit { .. })));
        assert_eq!(store.get_account(AccountId(1)).unwrap().balance, dec!(180));
    }

    #[test]
    fn test_bet_to_exact_zero_is_allowed() {
        let store = store_with_account(1, dec!(20));
        let balance = store
            .apply_transaction(AccountId(1), TransactionId(1), TransactionKind::Bet, dec!(20))
            .unwrap();
        assert_eq!(balance, Decimal::ZERO);
    }

    #[test]
    fn test_rejected_operations_leave_no_trace() {
        let store = store_with_account(1, dec!(10));
        store.collect_pending().iter().for_each(|p| store.acknowledge(p));

        let _ = store.apply_transaction(
            AccountId(1),
            TransactionId(1),
            TransactionKind::Bet,
            dec!(11),
        );
        assert!(store.transactions(AccountId(1)).unwrap().is_empty());
        assert!(store.dirty_flags(AccountId(1)).unwrap().is_clean());
        assert!(store.stats().is_empty());
        assert_eq!(store.pending_units(), 0);
    }

    #[test]
    fn test_duplicate_transaction_checked_per_account() {
        let store = store_with_account(1, dec!(100));
        store.create_account(AccountId(2), dec!(100)).unwrap();

        store
            .apply_transaction(AccountId(1), TransactionId(5), TransactionKind::Win, dec!(1))
            .unwrap();
        store
            .apply_transaction(AccountId(2), TransactionId(5), TransactionKind::Win, dec!(1))
            .unwrap();

        let dup =
            store.apply_transaction(AccountId(1), TransactionId(5), TransactionKind::Bet, dec!(1));
        assert!(matches!(dup, Err(Error::DuplicateTransaction { .. })));
        assert_eq!(store.get_account(AccountId(1)).unwrap().balance, dec!(101));
    }

    #[test]
    fn test_deposit_records_balance_snapshots() {
        let store = store_with_account(1, dec!(0));
        store.apply_deposit(AccountId(1), DepositId(1), dec!(5)).unwrap();
        store.apply_deposit(AccountId(1), DepositId(2), dec!(7)).unwrap();

        let deposits = store.deposits(AccountId(1)).unwrap();
        assert_eq!(deposits.len(), 2);
        assert_eq!(deposits[1].balance_before, dec!(5));
        assert_eq!(deposits[1].balance_after, dec!(12));
        assert!(deposits.iter().all(|d| d.is_unsynced()));
    }

    #[test]
    fn test_collect_and_acknowledge_clears_markers() {
        let store = store_with_account(1, dec!(100));
        store.apply_deposit(AccountId(1), DepositId(1), dec!(5)).unwrap();
        store
            .apply_transaction(AccountId(1), TransactionId(1), TransactionKind::Bet, dec!(5))
            .unwrap();

        let pending = store.collect_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].unit_count(), 4);
        assert_eq!(store.pending_units(), 4);

        store.acknowledge(&pending[0]);
        assert!(store.dirty_flags(AccountId(1)).unwrap().is_clean());
        assert_eq!(store.pending_units(), 0);
        assert!(store.collect_pending().is_empty());
    }

    #[test]
    fn test_acknowledge_keeps_changes_made_after_snapshot() {
        let store = store_with_account(1, dec!(100));
        store.apply_deposit(AccountId(1), DepositId(1), dec!(5)).unwrap();

        let pending = store.collect_pending();
        store.apply_deposit(AccountId(1), DepositId(2), dec!(6)).unwrap();
        store.acknowledge(&pending[0]);

        let flags = store.dirty_flags(AccountId(1)).unwrap();
        assert!(!flags.new);
        assert!(flags.balance);
        assert!(flags.deposits);

        let next = store.collect_pending();
        assert_eq!(next[0].deposits.len(), 1);
        assert_eq!(next[0].deposits[0].1.deposit_id, DepositId(2));
        assert_eq!(next[0].balance.as_ref().unwrap().balance, dec!(111));
    }

    #[test]
    fn test_concurrent_deposits_are_serialized() {
        let store = Arc::new(store_with_account(1, dec!(0)));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store
                            .apply_deposit(AccountId(1), DepositId(worker * 1000 + i), dec!(1))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_account(AccountId(1)).unwrap().balance, dec!(400));
        let deposits = store.deposits(AccountId(1)).unwrap();
        for pair in deposits.windows(2) {
            assert_eq!(pair[0].balance_after, pair[1].balance_before);
        }
    }

    #[test]
    fn test_deposit_overflow_is_rejected_without_trace() {
        let store = store_with_account(1, e27(50));
        store
            .apply_deposit(AccountId(1), DepositId(1), e27(20))
            .unwrap();

        let result =
            store.apply_deposit(AccountId(1), DepositId(2), e27(20));
        let err = result.unwrap_err();
        assert!(matches!(err, Error::AmountOverflow { .. }));
        assert!(err.is_validation());

        let snapshot = store.get_account(AccountId(1)).unwrap();
        assert_eq!(snapshot.balance, e27(70));
        assert_eq!(snapshot.stat.deposit_count, 1);
        assert_eq!(store.deposits(AccountId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_negative_bet_overflow_is_rejected() {
        let store = store_with_account(1, e27(50));
        let result = store.apply_transaction(
            AccountId(1),
            TransactionId(1),
            TransactionKind::Bet,
            e27(-50),
        );
        assert!(matches!(result, Err(Error::AmountOverflow { .. })));
        assert!(store.transactions(AccountId(1)).unwrap().is_empty());
        assert_eq!(
            store.get_account(AccountId(1)).unwrap().balance,
            e27(50)
        );
    }

    #[test]
    fn test_stat_overflow_keeps_account_and_stat_in_step() {
        // Balance stays in range while the deposit sum overflows
        let store = store_with_account(1, e27(-50));
        store
            .apply_deposit(AccountId(1), DepositId(1), e27(50))
            .unwrap();
        store
            .apply_deposit(AccountId(1), DepositId(2), e27(29))
            .unwrap();

        let result =
            store.apply_deposit(AccountId(1), DepositId(3), e27(29));
        assert!(matches!(result, Err(Error::AmountOverflow { .. })));

        let snapshot = store.get_account(AccountId(1)).unwrap();
        assert_eq!(snapshot.balance, e27(29));
        assert_eq!(snapshot.stat.deposit_count, 2);
        assert_eq!(store.deposits(AccountId(1)).unwrap().len(), 2);
    }

    #[test]
    fn test_funds_checked_before_duplicate_id() {
        let store = store_with_account(1, dec!(10));
        store
            .apply_transaction(AccountId(1), TransactionId(1), TransactionKind::Bet, dec!(5))
            .unwrap();

        let replay =
            store.apply_transaction(AccountId(1), TransactionId(1), TransactionKind::Bet, dec!(50));
        assert!(matches!(replay, Err(Error::InsufficientFunds { .. })));

        let replay =
            store.apply_transaction(AccountId(1), TransactionId(1), TransactionKind::Bet, dec!(5));
        assert!(matches!(replay, Err(Error::DuplicateTransaction { .. })));
        assert_eq!(store.get_account(AccountId(1)).unwrap().balance, dec!(5));
    }
}
