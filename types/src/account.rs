use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    board::GameMode,
    codec::{read_i64, read_string, string_encode_size, write_i64, write_string},
    money::Balance,
    validation::ValidationError,
    MAX_ACCOUNT_ID_LENGTH, STARTING_DEMO_BALANCE, STARTING_REAL_BALANCE,
};

/// Opaque user identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_ACCOUNT_ID_LENGTH
            && !id.chars().any(|c| c.is_control() || c.is_whitespace());
        if !valid {
            return Err(ValidationError::InvalidAccountId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Write for AccountId {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.0, writer);
    }
}

impl Read for AccountId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let raw = read_string(reader, MAX_ACCOUNT_ID_LENGTH)?;
        AccountId::new(raw).map_err(|_| Error::Invalid("AccountId", "malformed identifier"))
    }
}

impl EncodeSize for AccountId {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.0)
    }
}

/// Per-user balances. Mutated exclusively by the settlement ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub demo_balance: Balance,
    pub real_balance: Balance,
    pub blocked: bool,
    /// Creation time in unix milliseconds.
    pub created_at: u64,
    /// Incremented by every committed write, so newer copies always compare greater.
    #[serde(default)]
    pub revision: u64,
}

impl Account {
    pub fn new(id: AccountId, created_at: u64) -> Self {
        Self {
            id,
            demo_balance: STARTING_DEMO_BALANCE,
            real_balance: STARTING_REAL_BALANCE,
            blocked: false,
            created_at,
            revision: 0,
        }
    }

    pub fn balance(&self, mode: GameMode) -> Balance {
        match mode {
            GameMode::Demo => self.demo_balance,
            GameMode::Real => self.real_balance,
        }
    }

    pub fn balance_mut(&mut self, mode: GameMode) -> &mut Balance {
        match mode {
            GameMode::Demo => &mut self.demo_balance,
            GameMode::Real => &mut self.real_balance,
        }
    }
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        write_i64(self.demo_balance.minor(), writer);
        write_i64(self.real_balance.minor(), writer);
        self.blocked.write(writer);
        self.created_at.write(writer);
        self.revision.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: AccountId::read(reader)?,
            demo_balance: Balance::from_minor(read_i64(reader)?),
            real_balance: Balance::from_minor(read_i64(reader)?),
            blocked: bool::read(reader)?,
            created_at: u64::read(reader)?,
            revision: u64::read(reader)?,
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + 8
            + 8
            + self.blocked.encode_size()
            + self.created_at.encode_size()
            + self.revision.encode_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::Encode;

    #[test]
    fn new_accounts_get_starting_balances() {
        let account = Account::new(AccountId::new("alice").unwrap(), 7);
        assert_eq!(account.balance(GameMode::Demo), Balance::from_units(1_000));
        assert_eq!(account.balance(GameMode::Real), Balance::ZERO);
        assert!(!account.blocked);
    }

    #[test]
    fn account_ids_reject_blank_and_oversized() {
        assert_eq!(AccountId::new(""), Err(ValidationError::InvalidAccountId));
        assert_eq!(AccountId::new("a b"), Err(ValidationError::InvalidAccountId));
        assert!(AccountId::new("x".repeat(MAX_ACCOUNT_ID_LENGTH + 1)).is_err());
        assert!(serde_json::from_str::<AccountId>("\"\"").is_err());
    }

    #[test]
    fn codec_preserves_negative_balances() {
        let mut account = Account::new(AccountId::new("bob").unwrap(), 42);
        account.real_balance = Balance::from_minor(-5_000);
        account.blocked = true;
        account.revision = 9;
        let encoded = account.encode();
        assert_eq!(encoded.len(), account.encode_size());
        let decoded = Account::read(&mut &encoded[..]).unwrap();
        assert_eq!(decoded, account);
    }
}
