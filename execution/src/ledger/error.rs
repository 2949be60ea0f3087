use plinko_types::{
    AccountId, Amount, Balance, BetId, PaymentMethodId, TransactionId, ValidationError,
};
use std::fmt;
use thiserror::Error as ThisError;

/// The record a request referred to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Missing {
    Account(AccountId),
    Transaction(TransactionId),
    Bet(BetId),
    PaymentMethod(PaymentMethodId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Account(id) => write!(f, "account {id}"),
            Missing::Transaction(id) => write!(f, "transaction {id}"),
            Missing::Bet(id) => write!(f, "bet {id}"),
            Missing::PaymentMethod(id) => write!(f, "payment method {}", id.0),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Balance, required: Amount },
    #[error("{0} not found")]
    NotFound(Missing),
    #[error("write conflict persisted after {attempts} attempts")]
    Conflict { attempts: usize },
    #[error("permission denied: {0}")]
    Permission(&'static str),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl Error {
    /// Whether retrying with fresh state may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
