//! Fixed-point money.
//!
//! Balances and stakes are tracked in minor units (1 unit = 100 minor units) so that every
//! ledger delta is exact. Payout multipliers are tracked in hundredths.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

/// Minor units per whole unit.
pub const MINOR_UNITS: u64 = 100;

/// Hundredths per whole multiplier.
const MULTIPLIER_SCALE: u64 = 100;

#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum ParseAmountError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("amount has more than two decimal places")]
    Precision,
    #[error("amount is out of range")]
    Overflow,
    #[error("amount must not be negative")]
    Negative,
}

fn parse_minor(input: &str) -> Result<i128, ParseAmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseAmountError::Empty);
    }
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(ParseAmountError::Invalid(input.to_string()));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseAmountError::Invalid(input.to_string()));
    }
    if frac.len() > 2 {
        return Err(ParseAmountError::Precision);
    }

    let whole: i128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| ParseAmountError::Overflow)?
    };
    let mut frac_value: i128 = if frac.is_empty() {
        0
    } else {
        frac.parse().map_err(|_| ParseAmountError::Overflow)?
    };
    if frac.len() == 1 {
        frac_value *= 10;
    }

    let value = whole
        .checked_mul(MINOR_UNITS as i128)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or(ParseAmountError::Overflow)?;
    Ok(if negative { -value } else { value })
}

fn format_minor(value: i128, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let scale = MINOR_UNITS as u128;
    write!(f, "{sign}{}.{:02}", abs / scale, abs % scale)
}

/// A non-negative quantity of money (stake, transaction amount, payout).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub const fn from_units(units: u64) -> Self {
        Self(units * MINOR_UNITS)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn saturating_add(self, other: Amount) -> Amount {
        Amount(self.0.saturating_add(other.0))
    }

    /// Signed ledger delta for this amount.
    pub fn signed(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_minor(self.0 as i128, f)
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minor = parse_minor(s)?;
        if minor < 0 {
            return Err(ParseAmountError::Negative);
        }
        u64::try_from(minor)
            .map(Amount)
            .map_err(|_| ParseAmountError::Overflow)
    }
}

/// A signed account balance.
///
/// Balances may dip below zero when an administrator reverses an already spent deposit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Balance(i64);

impl Balance {
    pub const ZERO: Balance = Balance(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn from_units(units: i64) -> Self {
        Self(units * MINOR_UNITS as i64)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Apply a signed delta.
    pub fn apply(self, delta: i64) -> Balance {
        Balance(self.0.saturating_add(delta))
    }

    /// Whether this balance can fund `amount`.
    pub fn covers(self, amount: Amount) -> bool {
        i128::from(self.0) >= i128::from(amount.minor())
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Balance(amount.signed())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_minor(self.0 as i128, f)
    }
}

impl FromStr for Balance {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minor = parse_minor(s)?;
        i64::try_from(minor)
            .map(Balance)
            .map_err(|_| ParseAmountError::Overflow)
    }
}

/// Payout multiplier in hundredths (`150` is 1.5x).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ZERO: Multiplier = Multiplier(0);
    pub const ONE: Multiplier = Multiplier(MULTIPLIER_SCALE as u32);

    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(self) -> u32 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / MULTIPLIER_SCALE as f64
    }

    /// `stake × multiplier`, floored to a minor unit.
    pub fn payout(self, stake: Amount) -> Amount {
        let raw = u128::from(stake.minor()) * u128::from(self.0) / u128::from(MULTIPLIER_SCALE);
        Amount(u64::try_from(raw).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = MULTIPLIER_SCALE as u32;
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        if frac == 0 {
            write!(f, "{whole}")
        } else if frac % 10 == 0 {
            write!(f, "{whole}.{}", frac / 10)
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

struct MoneyVisitor;

impl de::Visitor<'_> for MoneyVisitor {
    type Value = i128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or a whole number of units")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        parse_minor(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        i128::from(v)
            .checked_mul(MINOR_UNITS as i128)
            .ok_or_else(|| E::custom(ParseAmountError::Overflow))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        i128::from(v)
            .checked_mul(MINOR_UNITS as i128)
            .ok_or_else(|| E::custom(ParseAmountError::Overflow))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() {
            return Err(E::custom(ParseAmountError::Invalid(v.to_string())));
        }
        parse_minor(&v.to_string()).map_err(E::custom)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let minor = deserializer.deserialize_any(MoneyVisitor)?;
        if minor < 0 {
            return Err(de::Error::custom(ParseAmountError::Negative));
        }
        u64::try_from(minor)
            .map(Amount)
            .map_err(|_| de::Error::custom(ParseAmountError::Overflow))
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let minor = deserializer.deserialize_any(MoneyVisitor)?;
        i64::try_from(minor)
            .map(Balance)
            .map_err(|_| de::Error::custom(ParseAmountError::Overflow))
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        let scaled = (value * MULTIPLIER_SCALE as f64).round();
        if !scaled.is_finite() || scaled < 0.0 || scaled > f64::from(u32::MAX) {
            return Err(de::Error::custom("multiplier out of range"));
        }
        Ok(Multiplier(scaled as u32))
    }
}
