use plinko_execution::{ChangeEvent, SharedBalance, TentativeBalance};
use plinko_types::{Account, AccountId, Balance, GameMode};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Per-bot view of balances and settlements, built from the change feed.
///
/// Stakes appear as tentative debits through the [`SharedBalance`] handed to each bot's
/// sequencer, and are reconciled here as the feed catches up.
#[derive(Default)]
pub struct Tracker {
    bots: BTreeMap<AccountId, Bot>,
}

struct Bot {
    balance: SharedBalance,
    settled: u64,
    wins: u64,
}

impl Tracker {
    /// Track `account`; returns the balance its sequencer should stake against.
    pub fn add(&mut self, account: &Account, mode: GameMode) -> SharedBalance {
        let balance = SharedBalance::new(TentativeBalance::new(account, mode));
        self.bots.insert(
            account.id.clone(),
            Bot {
                balance: balance.clone(),
                settled: 0,
                wins: 0,
            },
        );
        balance
    }

    pub fn bots(&self) -> usize {
        self.bots.len()
    }

    pub fn apply(&mut self, event: &ChangeEvent) {
        let Some(bot) = event.account().and_then(|id| self.bots.get_mut(id)) else {
            return;
        };
        match event {
            ChangeEvent::Account(_) => {
                bot.balance.lock().observe(event);
            }
            ChangeEvent::BetSettled { account_id, record } => {
                bot.settled += 1;
                if record.payout > record.amount {
                    bot.wins += 1;
                    debug!(
                        account = %account_id,
                        multiplier = %record.multiplier,
                        payout = %record.payout,
                        "Win"
                    );
                }
            }
            _ => {}
        }
    }

    /// Last balance seen on the feed, with stakes not yet reflected there.
    pub fn balance(&self, id: &AccountId) -> Option<Balance> {
        self.bots.get(id).map(|bot| bot.balance.lock().displayed())
    }

    /// (bots, settled bets, winning bets)
    pub fn stats(&self) -> (usize, u64, u64) {
        let settled = self.bots.values().map(|bot| bot.settled).sum();
        let wins = self.bots.values().map(|bot| bot.wins).sum();
        (self.bots.len(), settled, wins)
    }

    pub fn log_stats(&self) {
        let (bots, settled, wins) = self.stats();
        info!(bots, settled, wins, "Stats");
    }
}
