//! Common types used throughout plinko.

pub mod account;
pub mod board;
pub mod codec;
mod constants;
pub mod money;
pub mod outcome;
pub mod records;
pub mod validation;
pub mod wallet;

pub use account::{Account, AccountId};
pub use board::{BoardConfig, GameMode, PayoutCurve, RiskLevel};
pub use constants::*;
pub use money::{Amount, Balance, Multiplier, ParseAmountError};
pub use outcome::{BetHandle, BetId, BetRecord, OpenBet, OutcomeEvent};
pub use records::{Key, KeyKind, SequenceKind, Value};
pub use validation::ValidationError;
pub use wallet::{
    AdjustDirection, PaymentMethod, PaymentMethodId, PaymentMethodKind, SortKey, SortOrder,
    TransactionId, TransactionKind, TransactionQuery, TransactionStatus, WalletRequest,
    WalletTransaction,
};
