//! Per-account running totals
//!
//! Stats are an in-memory read accelerator only; they are never written back.
//! A stat is created on the first deposit or transaction for an account.

use crate::{
    types::{AccountId, Stat, TransactionKind},
    Error, Result,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Registry of per-account stats, guarded by one lock
#[derive(Debug, Default)]
pub struct StatAggregator {
    stats: Mutex<HashMap<AccountId, Stat>>,
}

impl StatAggregator {
    /// Empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a deposit
    pub fn record_deposit(&self, account_id: AccountId, amount: Decimal) -> Result<()> {
        self.record(account_id, amount, |stat| (&mut stat.deposit_count, &mut stat.deposit_sum))
    }

    /// Count a bet
    pub fn record_bet(&self, account_id: AccountId, amount: Decimal) -> Result<()> {
        self.record(account_id, amount, |stat| (&mut stat.bet_count, &mut stat.bet_sum))
    }

    /// Count a win
    pub fn record_win(&self, account_id: AccountId, amount: Decimal) -> Result<()> {
        self.record(account_id, amount, |stat| (&mut stat.win_count, &mut stat.win_sum))
    }

    /// Count a bet or win
    pub fn record_transaction(
        &self,
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<()> {
        match kind {
            TransactionKind::Bet => self.record_bet(account_id, amount),
            TransactionKind::Win => self.record_win(account_id, amount),
        }
    }

    /// Bump one counter and its sum together, or neither
    fn record<F>(&self, account_id: AccountId, amount: Decimal, select: F) -> Result<()>
    where
        F: FnOnce(&mut Stat) -> (&mut u64, &mut Decimal),
    {
        let mut stats = self.stats.lock();
        let mut stat = stats.get(&account_id).copied().unwrap_or_default();
        let (count, sum) = select(&mut stat);
        *sum = sum
            .checked_add(amount)
            .ok_or(Error::AmountOverflow { account_id, amount })?;
        *count = count.saturating_add(1);
        stats.insert(account_id, stat);
        Ok(())
    }

    /// Copy of the account's stat; zero-valued if nothing was recorded
    pub fn get_stat(&self, account_id: AccountId) -> Stat {
        self.stats
            .lock()
            .get(&account_id)
            .copied()
            .unwrap_or_default()
    }

    /// Number of accounts with a stat
    pub fn len(&self) -> usize {
        self.stats.lock().len()
    }

    /// True if no stat exists yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
