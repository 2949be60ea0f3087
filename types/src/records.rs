//! Storage keys and values.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};

use crate::{
    account::{Account, AccountId},
    outcome::{BetId, BetRecord, OpenBet},
    wallet::{PaymentMethod, PaymentMethodId, TransactionId, WalletTransaction},
    MAX_HISTORY_DECODE,
};

/// Monotonic id counters.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum SequenceKind {
    Transaction,
    Bet,
    PaymentMethod,
}

impl SequenceKind {
    fn tag(self) -> u8 {
        match self {
            SequenceKind::Transaction => 0,
            SequenceKind::Bet => 1,
            SequenceKind::PaymentMethod => 2,
        }
    }
}

/// Record family, used for range scans.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum KeyKind {
    Account,
    Transaction,
    Bet,
    History,
    PaymentMethod,
    Sequence,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Key {
    /// Account balances (tag 0)
    Account(AccountId),
    /// Wallet transaction (tag 1)
    Transaction(TransactionId),
    /// Open or settled bet (tag 2)
    Bet(BetId),
    /// Bet history, newest first (tag 3)
    History(AccountId),
    /// Payment method (tag 4)
    PaymentMethod(PaymentMethodId),
    /// Id counter (tag 5)
    Sequence(SequenceKind),
}

impl Key {
    pub fn kind(&self) -> KeyKind {
        match self {
            Key::Account(_) => KeyKind::Account,
            Key::Transaction(_) => KeyKind::Transaction,
            Key::Bet(_) => KeyKind::Bet,
            Key::History(_) => KeyKind::History,
            Key::PaymentMethod(_) => KeyKind::PaymentMethod,
            Key::Sequence(_) => KeyKind::Sequence,
        }
    }
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(id) => {
                0u8.write(writer);
                id.write(writer);
            }
            Self::Transaction(id) => {
                1u8.write(writer);
                id.0.write(writer);
            }
            Self::Bet(id) => {
                2u8.write(writer);
                id.0.write(writer);
            }
            Self::History(id) => {
                3u8.write(writer);
                id.write(writer);
            }
            Self::PaymentMethod(id) => {
                4u8.write(writer);
                id.0.write(writer);
            }
            Self::Sequence(kind) => {
                5u8.write(writer);
                kind.tag().write(writer);
            }
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(AccountId::read(reader)?),
            1 => Self::Transaction(TransactionId(u64::read(reader)?)),
            2 => Self::Bet(BetId(u64::read(reader)?)),
            3 => Self::History(AccountId::read(reader)?),
            4 => Self::PaymentMethod(PaymentMethodId(u64::read(reader)?)),
            5 => Self::Sequence(match u8::read(reader)? {
                0 => SequenceKind::Transaction,
                1 => SequenceKind::Bet,
                2 => SequenceKind::PaymentMethod,
                i => return Err(Error::InvalidEnum(i)),
            }),
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(id) | Self::History(id) => id.encode_size(),
                Self::Transaction(id) => id.0.encode_size(),
                Self::Bet(id) => id.0.encode_size(),
                Self::PaymentMethod(id) => id.0.encode_size(),
                Self::Sequence(_) => u8::SIZE,
            }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Value {
    Account(Account),
    Transaction(WalletTransaction),
    Bet(OpenBet),
    History(Vec<BetRecord>),
    PaymentMethod(PaymentMethod),
    Sequence(u64),
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::Transaction(tx) => {
                1u8.write(writer);
                tx.write(writer);
            }
            Self::Bet(bet) => {
                2u8.write(writer);
                bet.write(writer);
            }
            Self::History(records) => {
                3u8.write(writer);
                records.write(writer);
            }
            Self::PaymentMethod(method) => {
                4u8.write(writer);
                method.write(writer);
            }
            Self::Sequence(next) => {
                5u8.write(writer);
                next.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::Transaction(WalletTransaction::read(reader)?),
            2 => Self::Bet(OpenBet::read(reader)?),
            3 => Self::History(Vec::<BetRecord>::read_range(reader, 0..=MAX_HISTORY_DECODE)?),
            4 => Self::PaymentMethod(PaymentMethod::read(reader)?),
            5 => Self::Sequence(u64::read(reader)?),
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(account) => account.encode_size(),
                Self::Transaction(tx) => tx.encode_size(),
                Self::Bet(bet) => bet.encode_size(),
                Self::History(records) => records.encode_size(),
                Self::PaymentMethod(method) => method.encode_size(),
                Self::Sequence(next) => next.encode_size(),
            }
    }
}
