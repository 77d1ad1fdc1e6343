//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for money)
//! - camelCase JSON documents matching the persisted collections
//! - Copy-out reads (callers never borrow store internals)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw integer value
            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(
    /// Account (user) identifier
    AccountId
);
int_id!(
    /// Deposit identifier, unique within one account
    DepositId
);
int_id!(
    /// Transaction identifier, unique within one account
    TransactionId
);

/// Settlement transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Stake taken from the balance
    Bet,
    /// Payout added to the balance
    Win,
}

impl TransactionKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Bet => "Bet",
            TransactionKind::Win => "Win",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bet" => Ok(TransactionKind::Bet),
            "Win" => Ok(TransactionKind::Win),
            other => Err(format!("\"type\" must be \"Win\" or \"Bet\", got {:?}", other)),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deposit applied to an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    /// Owning account
    pub user_id: AccountId,

    /// Deposit ID (scoped to the account)
    pub deposit_id: DepositId,

    /// Deposited amount
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    /// Balance before the deposit was applied
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_before: Decimal,

    /// Balance after the deposit was applied
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_after: Decimal,

    /// Apply time
    pub time: DateTime<Utc>,

    /// Not yet written to the durable store
    #[serde(skip)]
    pub(crate) unsynced: bool,
}

impl Deposit {
    /// Document key in the `deposits` collection
    pub fn document_key(&self) -> String {
        format!("{}:{}", self.user_id, self.deposit_id)
    }

    /// Whether this record still waits for write-back
    pub fn is_unsynced(&self) -> bool {
        self.unsynced
    }
}

/// Bet or win applied to an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Owning account
    pub user_id: AccountId,

    /// Transaction ID (scoped to the account)
    pub transaction_id: TransactionId,

    /// Bet or Win
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    /// Transaction amount
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,

    /// Balance before the transaction was applied
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_before: Decimal,

    /// Balance after the transaction was applied
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_after: Decimal,

    /// Apply time
    pub time: DateTime<Utc>,

    /// Not yet written to the durable store
    #[serde(skip)]
    pub(crate) unsynced: bool,
}

impl Transaction {
    /// Document key in the `transactions` collection
    pub fn document_key(&self) -> String {
        format!("{}:{}", self.user_id, self.transaction_id)
    }

    /// Whether this record still waits for write-back
    pub fn is_unsynced(&self) -> bool {
        self.unsynced
    }
}

/// Dirty markers tracked per account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    /// Account has never been persisted
    pub new: bool,
    /// Balance changed since the last sync
    pub balance: bool,
    /// At least one deposit is unsynced
    pub deposits: bool,
    /// At least one transaction is unsynced
    pub transactions: bool,
}

impl DirtyFlags {
    /// No marker set
    pub fn is_clean(&self) -> bool {
        !(self.new || self.balance || self.deposits || self.transactions)
    }
}

/// Account with its append-only histories
#[derive(Debug, Clone)]
pub struct Account {
    pub(crate) id: AccountId,
    pub(crate) balance: Decimal,
    pub(crate) deposits: Vec<Deposit>,
    pub(crate) transactions: Vec<Transaction>,
    /// Bumped on every balance change; compared when clearing the balance marker
    pub(crate) revision: u64,
    pub(crate) dirty: DirtyFlags,
}

impl Account {
    /// Fresh account, marked as never persisted
    pub(crate) fn new(id: AccountId, balance: Decimal) -> Self {
        Self {
            id,
            balance,
            deposits: Vec::new(),
            transactions: Vec::new(),
            revision: 0,
            dirty: DirtyFlags {
                new: true,
                ..DirtyFlags::default()
            },
        }
    }

    /// Account ID
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Current balance
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Deposit history in apply order
    pub fn deposits(&self) -> &[Deposit] {
        &self.deposits
    }

    /// Transaction history in apply order
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Current dirty markers
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    /// Persisted form of the account
    pub fn record(&self) -> AccountRecord {
        AccountRecord {
            id: self.id,
            balance: self.balance,
        }
    }

    pub(crate) fn has_deposit(&self, deposit_id: DepositId) -> bool {
        self.deposits.iter().any(|d| d.deposit_id == deposit_id)
    }

    pub(crate) fn has_transaction(&self, transaction_id: TransactionId) -> bool {
        self.transactions
            .iter()
            .any(|t| t.transaction_id == transaction_id)
    }

    /// Balance after applying `amount` of `kind`; `None` on decimal overflow
    pub(crate) fn projected_balance(&self, kind: TransactionKind, amount: Decimal) -> Option<Decimal> {
        match kind {
            TransactionKind::Bet => self.balance.checked_sub(amount),
            TransactionKind::Win => self.balance.checked_add(amount),
        }
    }

    /// Append a deposit and move the balance to `balance_after`.
    /// Caller has done all checks.
    pub(crate) fn push_deposit(
        &mut self,
        deposit_id: DepositId,
        amount: Decimal,
        balance_after: Decimal,
    ) -> Decimal {
        let before = self.balance;
        self.balance = balance_after;
        self.deposits.push(Deposit {
            user_id: self.id,
            deposit_id,
            amount,
            balance_before: before,
            balance_after: self.balance,
            time: Utc::now(),
            unsynced: true,
        });
        self.revision += 1;
        self.dirty.balance = true;
        self.dirty.deposits = true;
        self.balance
    }

    /// Append a transaction and move the balance to `balance_after`.
    /// Caller has done all checks.
    pub(crate) fn push_transaction(
        &mut self,
        transaction_id: TransactionId,
        kind: TransactionKind,
        amount: Decimal,
        balance_after: Decimal,
    ) -> Decimal {
        let before = self.balance;
        self.balance = balance_after;
        self.transactions.push(Transaction {
            user_id: self.id,
            transaction_id,
            kind,
            amount,
            balance_before: before,
            balance_after: self.balance,
            time: Utc::now(),
            unsynced: true,
        });
        self.revision += 1;
        self.dirty.balance = true;
        self.dirty.transactions = true;
        self.balance
    }
}

/// Persisted account document (`users` collection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account ID
    pub id: AccountId,
    /// Balance at write time
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
}

/// Running per-account totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    /// Number of deposits
    pub deposit_count: u64,
    /// Sum of deposit amounts
    #[serde(with = "rust_decimal::serde::float")]
    pub deposit_sum: Decimal,
    /// Number of bets
    pub bet_count: u64,
    /// Sum of bet amounts
    #[serde(with = "rust_decimal::serde::float")]
    pub bet_sum: Decimal,
    /// Number of wins
    pub win_count: u64,
    /// Sum of win amounts
    #[serde(with = "rust_decimal::serde::float")]
    pub win_sum: Decimal,
}

/// Read view returned by `GetAccount`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    /// Account ID
    pub id: AccountId,
    /// Current balance
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    /// Aggregate statistics
    #[serde(flatten)]
    pub stat: Stat,
}
