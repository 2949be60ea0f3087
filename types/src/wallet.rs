//! Wallet transactions and payment methods.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{
    account::AccountId,
    codec::{
        opt_string_encode_size, read_opt_string, read_string, string_encode_size,
        write_opt_string, write_string,
    },
    money::Amount,
    validation::ValidationError,
    MAX_EXTERNAL_REF_LENGTH, MAX_METHOD_NAME_LENGTH, MAX_METHOD_NUMBER_LENGTH, MAX_NOTE_LENGTH,
    PHONE_LENGTH,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit = 0,
    Withdraw = 1,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 2] = [TransactionKind::Deposit, TransactionKind::Withdraw];

    /// Whether a transaction of this kind currently has its amount reflected in the balance.
    ///
    /// Deposits credit only once approved. Withdrawals lock funds at submission, so they stay
    /// deducted while pending or approved and are refunded otherwise.
    pub fn holds_funds(self, status: TransactionStatus) -> bool {
        match self {
            TransactionKind::Deposit => status == TransactionStatus::Approved,
            TransactionKind::Withdraw => matches!(
                status,
                TransactionStatus::Pending | TransactionStatus::Approved
            ),
        }
    }

    /// Sign of this kind's balance effect while it holds funds.
    pub fn direction(self) -> i64 {
        match self {
            TransactionKind::Deposit => 1,
            TransactionKind::Withdraw => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            _ => Err(ValidationError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending = 0,
    Approved = 1,
    Rejected = 2,
    Cancelled = 3,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Approved,
        TransactionStatus::Rejected,
        TransactionStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "rejected" => Ok(TransactionStatus::Rejected),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            _ => Err(ValidationError::UnknownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Write for TransactionKind {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for TransactionKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(TransactionKind::Deposit),
            1 => Ok(TransactionKind::Withdraw),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for TransactionKind {
    fn encode_size(&self) -> usize {
        1
    }
}

impl Write for TransactionStatus {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for TransactionStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(TransactionStatus::Pending),
            1 => Ok(TransactionStatus::Approved),
            2 => Ok(TransactionStatus::Rejected),
            3 => Ok(TransactionStatus::Cancelled),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for TransactionStatus {
    fn encode_size(&self) -> usize {
        1
    }
}

/// A deposit or withdrawal request and its review state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub status: TransactionStatus,
    /// Payment method name (`admin` for administrator adjustments).
    pub method: String,
    /// Player's mobile number; absent on administrator adjustments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    /// Unix milliseconds.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl WalletTransaction {
    /// Signed balance effect this transaction has while in `status`.
    pub fn held_delta(&self, status: TransactionStatus) -> i64 {
        if self.kind.holds_funds(status) {
            self.kind.direction() * self.amount.signed()
        } else {
            0
        }
    }
}

impl Write for WalletTransaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.0.write(writer);
        self.account_id.write(writer);
        self.kind.write(writer);
        self.amount.minor().write(writer);
        self.status.write(writer);
        write_string(&self.method, writer);
        write_opt_string(self.counterparty_phone.as_deref(), writer);
        write_opt_string(self.external_ref.as_deref(), writer);
        self.created_at.write(writer);
        write_opt_string(self.note.as_deref(), writer);
    }
}

impl Read for WalletTransaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: TransactionId(u64::read(reader)?),
            account_id: AccountId::read(reader)?,
            kind: TransactionKind::read(reader)?,
            amount: Amount::from_minor(u64::read(reader)?),
            status: TransactionStatus::read(reader)?,
            method: read_string(reader, MAX_METHOD_NAME_LENGTH)?,
            counterparty_phone: read_opt_string(reader, PHONE_LENGTH)?,
            external_ref: read_opt_string(reader, MAX_EXTERNAL_REF_LENGTH)?,
            created_at: u64::read(reader)?,
            note: read_opt_string(reader, MAX_NOTE_LENGTH * 4)?,
        })
    }
}

impl EncodeSize for WalletTransaction {
    fn encode_size(&self) -> usize {
        self.id.0.encode_size()
            + self.account_id.encode_size()
            + self.kind.encode_size()
            + self.amount.minor().encode_size()
            + self.status.encode_size()
            + string_encode_size(&self.method)
            + opt_string_encode_size(self.counterparty_phone.as_deref())
            + opt_string_encode_size(self.external_ref.as_deref())
            + self.created_at.encode_size()
            + opt_string_encode_size(self.note.as_deref())
    }
}

/// Player-submitted deposit or withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub kind: TransactionKind,
    pub amount: Amount,
    pub method: String,
    pub counterparty_phone: String,
    #[serde(default)]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Direction of an administrator balance adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustDirection {
    Credit,
    Debit,
}

impl AdjustDirection {
    pub fn kind(self) -> TransactionKind {
        match self {
            AdjustDirection::Credit => TransactionKind::Deposit,
            AdjustDirection::Debit => TransactionKind::Withdraw,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethodId(pub u64);

#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    #[default]
    MobileBanking = 0,
    Bank = 1,
    Crypto = 2,
    Other = 3,
}

impl Write for PaymentMethodKind {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for PaymentMethodKind {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(PaymentMethodKind::MobileBanking),
            1 => Ok(PaymentMethodKind::Bank),
            2 => Ok(PaymentMethodKind::Crypto),
            3 => Ok(PaymentMethodKind::Other),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for PaymentMethodKind {
    fn encode_size(&self) -> usize {
        1
    }
}

/// A deposit/withdrawal channel configured by an administrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    /// Display name, matched case-insensitively against submissions.
    pub name: String,
    /// Receiving number shown to players for deposits.
    pub number: String,
    pub enabled: bool,
    pub kind: PaymentMethodKind,
}

impl PaymentMethod {
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.trim())
    }
}

impl Write for PaymentMethod {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.0.write(writer);
        write_string(&self.name, writer);
        write_string(&self.number, writer);
        self.enabled.write(writer);
        self.kind.write(writer);
    }
}

impl Read for PaymentMethod {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: PaymentMethodId(u64::read(reader)?),
            name: read_string(reader, MAX_METHOD_NAME_LENGTH * 4)?,
            number: read_string(reader, MAX_METHOD_NUMBER_LENGTH * 4)?,
            enabled: bool::read(reader)?,
            kind: PaymentMethodKind::read(reader)?,
        })
    }
}

impl EncodeSize for PaymentMethod {
    fn encode_size(&self) -> usize {
        self.id.0.encode_size()
            + string_encode_size(&self.name)
            + string_encode_size(&self.number)
            + self.enabled.encode_size()
            + self.kind.encode_size()
    }
}

/// Field a transaction listing is ordered by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Timestamp,
    Amount,
    Kind,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Administrator transaction listing parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    pub account_id: Option<AccountId>,
    pub kind: Option<TransactionKind>,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl TransactionQuery {
    pub fn matches(&self, tx: &WalletTransaction) -> bool {
        self.status.is_none_or(|status| tx.status == status)
            && self.kind.is_none_or(|kind| tx.kind == kind)
            && self
                .account_id
                .as_ref()
                .is_none_or(|account| &tx.account_id == account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_codec::Encode;

    fn sample(kind: TransactionKind, status: TransactionStatus) -> WalletTransaction {
        WalletTransaction {
            id: TransactionId(9),
            account_id: AccountId::new("carol").unwrap(),
            kind,
            amount: Amount::from_units(500),
            status,
            method: "bkash".to_string(),
            counterparty_phone: Some("01712345678".to_string()),
            external_ref: Some("TRX12345".to_string()),
            created_at: 1_700_000_000_000,
            note: None,
        }
    }

    #[test]
    fn funds_held_per_kind() {
        use TransactionStatus::*;
        let deposit = TransactionKind::Deposit;
        assert!(deposit.holds_funds(Approved));
        for status in [Pending, Rejected, Cancelled] {
            assert!(!deposit.holds_funds(status));
        }
        let withdraw = TransactionKind::Withdraw;
        assert!(withdraw.holds_funds(Pending));
        assert!(withdraw.holds_funds(Approved));
        assert!(!withdraw.holds_funds(Rejected));
        assert!(!withdraw.holds_funds(Cancelled));
    }

    #[test]
    fn held_delta_is_signed_by_kind() {
        let deposit = sample(TransactionKind::Deposit, TransactionStatus::Pending);
        assert_eq!(deposit.held_delta(TransactionStatus::Approved), 50_000);
        assert_eq!(deposit.held_delta(TransactionStatus::Pending), 0);
        let withdraw = sample(TransactionKind::Withdraw, TransactionStatus::Pending);
        assert_eq!(withdraw.held_delta(TransactionStatus::Pending), -50_000);
        assert_eq!(withdraw.held_delta(TransactionStatus::Cancelled), 0);
    }

    #[test]
    fn transaction_codec_roundtrip() {
        let mut tx = sample(TransactionKind::Withdraw, TransactionStatus::Cancelled);
        tx.note = Some("requested by player".to_string());
        tx.external_ref = None;
        let encoded = tx.encode();
        assert_eq!(encoded.len(), tx.encode_size());
        assert_eq!(WalletTransaction::read(&mut &encoded[..]).unwrap(), tx);
    }

    #[test]
    fn unknown_status_tag_is_rejected() {
        let bytes = [7u8];
        assert!(matches!(
            TransactionStatus::read(&mut &bytes[..]),
            Err(Error::InvalidEnum(7))
        ));
    }

    #[test]
    fn query_filters_compose() {
        let tx = sample(TransactionKind::Deposit, TransactionStatus::Pending);
        assert!(TransactionQuery::default().matches(&tx));
        let query = TransactionQuery {
            status: Some(TransactionStatus::Pending),
            account_id: Some(AccountId::new("carol").unwrap()),
            ..Default::default()
        };
        assert!(query.matches(&tx));
        let query = TransactionQuery {
            kind: Some(TransactionKind::Withdraw),
            ..Default::default()
        };
        assert!(!query.matches(&tx));
    }

    #[test]
    fn wallet_request_parses_from_json() {
        let request: WalletRequest = serde_json::from_str(
            r#"{"kind":"deposit","amount":"500","method":"bkash","counterpartyPhone":"01712345678","externalRef":"ABC123"}"#,
        )
        .unwrap();
        assert_eq!(request.amount, Amount::from_units(500));
        assert_eq!(request.external_ref.as_deref(), Some("ABC123"));
        assert_eq!(request.note, None);
    }
}
