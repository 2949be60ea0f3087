use crate::money::{Amount, Balance};

/// Fewest peg rows a board may have.
pub const MIN_ROWS: u8 = 8;

/// Most peg rows a board may have.
pub const MAX_ROWS: u8 = 16;

/// Default board rows.
pub const DEFAULT_ROWS: u8 = 16;

/// Demo balance granted on account creation (and on demo reset).
pub const STARTING_DEMO_BALANCE: Balance = Balance::from_units(1_000);

/// Real balance granted on account creation.
pub const STARTING_REAL_BALANCE: Balance = Balance::ZERO;

/// Smallest deposit or withdrawal a player may submit.
pub const MIN_WALLET_AMOUNT: Amount = Amount::from_units(100);

/// Largest deposit or withdrawal a player may submit.
pub const MAX_WALLET_AMOUNT: Amount = Amount::from_units(25_000);

/// Local mobile numbers are exactly 11 digits starting with `01`.
pub const PHONE_LENGTH: usize = 11;
pub const PHONE_PREFIX: &str = "01";

/// Deposit reference length bounds (alphanumeric).
pub const MIN_EXTERNAL_REF_LENGTH: usize = 6;
pub const MAX_EXTERNAL_REF_LENGTH: usize = 30;

/// Bet records kept per account (newest first).
pub const BET_HISTORY_LIMIT: usize = 50;

/// Maximum account identifier length
pub const MAX_ACCOUNT_ID_LENGTH: usize = 128;

/// Maximum free-form note length on wallet transactions
pub const MAX_NOTE_LENGTH: usize = 256;

/// Maximum payment method name length
pub const MAX_METHOD_NAME_LENGTH: usize = 32;

/// Maximum payment method receiving number length
pub const MAX_METHOD_NUMBER_LENGTH: usize = 64;

/// Payment method recorded on administrator adjustments.
pub const ADMIN_METHOD: &str = "admin";

/// Default notes for administrator adjustments.
pub const ADMIN_CREDIT_NOTE: &str = "Admin Bonus";
pub const ADMIN_DEBIT_NOTE: &str = "Admin Correction";

/// Upper bound on bet history entries accepted when decoding.
pub const MAX_HISTORY_DECODE: usize = 1_024;
