//! Boundary validation.
//!
//! Everything here runs before a mutation starts, so a rejected request never touches state.

use thiserror::Error as ThisError;

use crate::{
    money::{Amount, ParseAmountError},
    MAX_EXTERNAL_REF_LENGTH, MAX_METHOD_NAME_LENGTH, MAX_METHOD_NUMBER_LENGTH, MAX_NOTE_LENGTH,
    MAX_ROWS, MAX_WALLET_AMOUNT, MIN_EXTERNAL_REF_LENGTH, MIN_ROWS, MIN_WALLET_AMOUNT,
    PHONE_LENGTH, PHONE_PREFIX,
};

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum ValidationError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange {
        amount: Amount,
        min: Amount,
        max: Amount,
    },
    #[error("invalid amount: {0}")]
    Amount(#[from] ParseAmountError),
    #[error("phone number must be exactly 11 digits starting with '01'")]
    InvalidPhone,
    #[error("external reference is required for deposits")]
    MissingExternalRef,
    #[error("external reference must be 6-30 letters or digits")]
    InvalidExternalRef,
    #[error("rows must be within [8, 16] (got {0})")]
    RowsOutOfRange(u8),
    #[error("unknown risk level: {0}")]
    UnknownRiskLevel(String),
    #[error("unknown game mode: {0}")]
    UnknownMode(String),
    #[error("unknown transaction status: {0}")]
    UnknownStatus(String),
    #[error("unknown transaction kind: {0}")]
    UnknownKind(String),
    #[error("invalid account id")]
    InvalidAccountId,
    #[error("unknown payment method: {0}")]
    UnknownPaymentMethod(String),
    #[error("payment method is disabled: {0}")]
    PaymentMethodDisabled(String),
    #[error("payment method name must be 1-32 characters")]
    InvalidMethodName,
    #[error("payment method number must be 1-64 characters")]
    InvalidMethodNumber,
    #[error("note longer than 256 characters")]
    NoteTooLong,
    #[error("center bias must be within [0, 0.25] (got {0})")]
    CenterBiasOutOfRange(f64),
    #[error("payout curve must have {expected} buckets (got {got})")]
    CurveLength { expected: usize, got: usize },
    #[error("payout curve is not symmetric at bucket {0}")]
    AsymmetricCurve(usize),
    #[error("bucket {index} outside a board of {buckets} buckets")]
    BucketOutOfRange { index: usize, buckets: usize },
    #[error("outcome stake {got} does not match bet stake {expected}")]
    StakeMismatch { expected: Amount, got: Amount },
    #[error("outcome multiplier does not match the board at bucket {0}")]
    MultiplierMismatch(usize),
    #[error("payment method already exists: {0}")]
    DuplicatePaymentMethod(String),
}

/// Bets only need to be positive; the balance check happens atomically in the ledger.
pub fn validate_stake(amount: Amount) -> Result<(), ValidationError> {
    if amount.is_zero() {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(())
}

/// Deposits and withdrawals submitted by players.
pub fn validate_wallet_amount(amount: Amount) -> Result<(), ValidationError> {
    validate_stake(amount)?;
    if amount < MIN_WALLET_AMOUNT || amount > MAX_WALLET_AMOUNT {
        return Err(ValidationError::AmountOutOfRange {
            amount,
            min: MIN_WALLET_AMOUNT,
            max: MAX_WALLET_AMOUNT,
        });
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let valid = phone.len() == PHONE_LENGTH
        && phone.starts_with(PHONE_PREFIX)
        && phone.bytes().all(|b| b.is_ascii_digit());
    if !valid {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(())
}

/// Returns the trimmed reference.
pub fn validate_external_ref(reference: &str) -> Result<String, ValidationError> {
    let trimmed = reference.trim();
    let valid = (MIN_EXTERNAL_REF_LENGTH..=MAX_EXTERNAL_REF_LENGTH).contains(&trimmed.len())
        && trimmed.bytes().all(|b| b.is_ascii_alphanumeric());
    if !valid {
        return Err(ValidationError::InvalidExternalRef);
    }
    Ok(trimmed.to_string())
}

pub fn validate_rows(rows: u8) -> Result<(), ValidationError> {
    if !(MIN_ROWS..=MAX_ROWS).contains(&rows) {
        return Err(ValidationError::RowsOutOfRange(rows));
    }
    Ok(())
}

pub fn validate_note(note: Option<&str>) -> Result<(), ValidationError> {
    match note {
        Some(note) if note.chars().count() > MAX_NOTE_LENGTH => Err(ValidationError::NoteTooLong),
        _ => Ok(()),
    }
}

pub fn validate_method_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_METHOD_NAME_LENGTH {
        return Err(ValidationError::InvalidMethodName);
    }
    Ok(())
}

pub fn validate_method_number(number: &str) -> Result<(), ValidationError> {
    let trimmed = number.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_METHOD_NUMBER_LENGTH {
        return Err(ValidationError::InvalidMethodNumber);
    }
    Ok(())
}
