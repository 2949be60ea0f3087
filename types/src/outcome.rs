//! Bets, drop outcomes and bet history.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    account::AccountId,
    board::{BoardConfig, GameMode},
    codec::{read_i64, write_i64},
    money::{Amount, Balance, Multiplier},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BetId(pub u64);

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bet-{}", self.0)
    }
}

/// A stake that has been debited but not yet settled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenBet {
    pub id: BetId,
    pub account_id: AccountId,
    pub stake: Amount,
    pub mode: GameMode,
    pub board: BoardConfig,
    pub placed_at: u64,
    pub settled: bool,
}

impl OpenBet {
    /// Handle for this bet, given the account as committed with the stake debited.
    pub fn handle(&self, balance_after: Balance, revision: u64) -> BetHandle {
        BetHandle {
            bet_id: self.id,
            account_id: self.account_id.clone(),
            stake: self.stake,
            mode: self.mode,
            board: self.board,
            balance_after,
            revision,
        }
    }
}

impl Write for OpenBet {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.0.write(writer);
        self.account_id.write(writer);
        self.stake.minor().write(writer);
        self.mode.write(writer);
        self.board.write(writer);
        self.placed_at.write(writer);
        self.settled.write(writer);
    }
}

impl Read for OpenBet {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: BetId(u64::read(reader)?),
            account_id: AccountId::read(reader)?,
            stake: Amount::from_minor(u64::read(reader)?),
            mode: GameMode::read(reader)?,
            board: BoardConfig::read(reader)?,
            placed_at: u64::read(reader)?,
            settled: bool::read(reader)?,
        })
    }
}

impl EncodeSize for OpenBet {
    fn encode_size(&self) -> usize {
        self.id.0.encode_size()
            + self.account_id.encode_size()
            + self.stake.minor().encode_size()
            + self.mode.encode_size()
            + self.board.encode_size()
            + self.placed_at.encode_size()
            + self.settled.encode_size()
    }
}

/// Returned by `place_bet`; correlates the later outcome with the debited stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetHandle {
    pub bet_id: BetId,
    pub account_id: AccountId,
    pub stake: Amount,
    pub mode: GameMode,
    pub board: BoardConfig,
    /// Balance of `mode` right after the stake was debited.
    pub balance_after: Balance,
    /// Account revision that carries the debit.
    pub revision: u64,
}

/// The result of one drop, consumed exactly once by settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    pub bet_id: BetId,
    pub account_id: AccountId,
    pub stake: Amount,
    pub bucket: usize,
    pub multiplier: Multiplier,
}

impl OutcomeEvent {
    pub fn payout(&self) -> Amount {
        self.multiplier.payout(self.stake)
    }
}

/// Settled bet kept in the account's history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRecord {
    pub id: BetId,
    pub amount: Amount,
    pub multiplier: Multiplier,
    pub payout: Amount,
    /// `payout - amount`.
    pub profit: Balance,
    pub timestamp: u64,
    pub mode: GameMode,
}

impl BetRecord {
    pub fn new(event: &OutcomeEvent, mode: GameMode, timestamp: u64) -> Self {
        let payout = event.payout();
        Self {
            id: event.bet_id,
            amount: event.stake,
            multiplier: event.multiplier,
            payout,
            profit: Balance::from(payout).apply(-event.stake.signed()),
            timestamp,
            mode,
        }
    }
}

impl Write for BetRecord {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.0.write(writer);
        self.amount.minor().write(writer);
        self.multiplier.hundredths().write(writer);
        self.payout.minor().write(writer);
        write_i64(self.profit.minor(), writer);
        self.timestamp.write(writer);
        self.mode.write(writer);
    }
}

impl Read for BetRecord {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            id: BetId(u64::read(reader)?),
            amount: Amount::from_minor(u64::read(reader)?),
            multiplier: Multiplier::from_hundredths(u32::read(reader)?),
            payout: Amount::from_minor(u64::read(reader)?),
            profit: Balance::from_minor(read_i64(reader)?),
            timestamp: u64::read(reader)?,
            mode: GameMode::read(reader)?,
        })
    }
}

impl EncodeSize for BetRecord {
    fn encode_size(&self) -> usize {
        self.id.0.encode_size()
            + self.amount.minor().encode_size()
            + self.multiplier.hundredths().encode_size()
            + self.payout.minor().encode_size()
            + 8
            + self.timestamp.encode_size()
            + self.mode.encode_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::RiskLevel;
    use commonware_codec::Encode;

    #[test]
    fn bet_record_profit_can_be_negative() {
        let event = OutcomeEvent {
            bet_id: BetId(3),
            account_id: AccountId::new("dave").unwrap(),
            stake: Amount::from_units(100),
            bucket: 8,
            multiplier: Multiplier::from_hundredths(20),
        };
        let record = BetRecord::new(&event, GameMode::Demo, 11);
        assert_eq!(record.payout, Amount::from_units(20));
        assert_eq!(record.profit, Balance::from_units(-80));

        let encoded = record.encode();
        assert_eq!(encoded.len(), record.encode_size());
        assert_eq!(BetRecord::read(&mut &encoded[..]).unwrap(), record);
    }

    #[test]
    fn open_bet_rejects_corrupt_board() {
        let bet = OpenBet {
            id: BetId(1),
            account_id: AccountId::new("erin").unwrap(),
            stake: Amount::from_units(5),
            mode: GameMode::Real,
            board: BoardConfig::new(12, RiskLevel::High).unwrap(),
            placed_at: 0,
            settled: false,
        };
        let mut encoded = bet.encode().to_vec();
        assert_eq!(OpenBet::read(&mut &encoded[..]).unwrap(), bet);

        // rows byte sits after id (8), account id (4 + 4), stake (8) and mode (1)
        encoded[25] = 40;
        assert!(OpenBet::read(&mut &encoded[..]).is_err());
    }
}
