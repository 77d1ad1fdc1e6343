//! Error types for the wallet ledger

use crate::types::{AccountId, DepositId, TransactionId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Account ID already registered
    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountId),

    /// No account with this ID
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Deposit ID already recorded for the account
    #[error("Deposit {deposit_id} already recorded for account {account_id}")]
    DuplicateDeposit {
        /// Account
        account_id: AccountId,
        /// Rejected deposit ID
        deposit_id: DepositId,
    },

    /// Transaction ID already recorded for the account
    #[error("Transaction {transaction_id} already recorded for account {account_id}")]
    DuplicateTransaction {
        /// Account
        account_id: AccountId,
        /// Rejected transaction ID
        transaction_id: TransactionId,
    },

    /// Bet larger than the balance
    #[error("Insufficient funds: balance {balance}, requested {amount}")]
    InsufficientFunds {
        /// Balance at check time
        balance: Decimal,
        /// Requested bet amount
        amount: Decimal,
    },

    /// Balance or stat total would leave the decimal range
    #[error("Amount {amount} out of range for account {account_id}")]
    AmountOverflow {
        /// Account
        account_id: AccountId,
        /// Rejected amount
        amount: Decimal,
    },

    /// Storage error (durable store)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence call exceeded its deadline
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Gateway operation
        operation: String,
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// Concurrency error (task join failure, closed channel)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Expected business rejection; store state is unchanged
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::DuplicateAccount(_)
                | Error::AccountNotFound(_)
                | Error::DuplicateDeposit { .. }
                | Error::DuplicateTransaction { .. }
                | Error::InsufficientFunds { .. }
                | Error::AmountOverflow { .. }
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
