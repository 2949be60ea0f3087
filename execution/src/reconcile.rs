//! Optimistic balance display.
//!
//! A caller may show the effect of a request before the ledger has committed it. Tentative deltas
//! live on top of the last authoritative balance and never replace it. A delta is dropped once an
//! authoritative balance at or past the account revision that committed it has been seen, when
//! its request fails, or when it times out. Authoritative balances older than the one held are
//! ignored, so feed events may arrive late or out of order.

use plinko_types::{Account, AccountId, Balance, GameMode};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, warn};

use crate::feed::ChangeEvent;

/// Identifies one tentative delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingOp(u64);

#[derive(Clone, Debug)]
struct Tentative {
    delta: i64,
    deadline: u64,
    /// Account revision that carries this delta, once known.
    committed_at: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct TentativeBalance {
    account_id: AccountId,
    mode: GameMode,
    authoritative: Balance,
    revision: u64,
    pending: BTreeMap<PendingOp, Tentative>,
    next: u64,
}

impl TentativeBalance {
    pub fn new(account: &Account, mode: GameMode) -> Self {
        Self {
            account_id: account.id.clone(),
            mode,
            authoritative: account.balance(mode),
            revision: account.revision,
            pending: BTreeMap::new(),
            next: 0,
        }
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn authoritative(&self) -> Balance {
        self.authoritative
    }

    /// Account revision of [`TentativeBalance::authoritative`].
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Authoritative balance plus every live tentative delta.
    pub fn displayed(&self) -> Balance {
        self.pending
            .values()
            .fold(self.authoritative, |balance, op| balance.apply(op.delta))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Show `delta` until `deadline` (unix milliseconds) unless resolved sooner.
    pub fn apply_tentative(&mut self, delta: i64, deadline: u64) -> PendingOp {
        let op = PendingOp(self.next);
        self.next += 1;
        self.pending.insert(
            op,
            Tentative {
                delta,
                deadline,
                committed_at: None,
            },
        );
        op
    }

    /// The request behind `op` committed as account `revision`.
    ///
    /// The delta stays visible until an authoritative balance of that revision or later arrives.
    /// If one already has, the delta is dropped now.
    pub fn confirm(&mut self, op: PendingOp, revision: u64) -> bool {
        if revision <= self.revision {
            return self.pending.remove(&op).is_some();
        }
        match self.pending.get_mut(&op) {
            Some(tentative) => {
                tentative.committed_at = Some(revision);
                true
            }
            None => false,
        }
    }

    /// The request behind `op` failed; roll its delta back.
    pub fn fail(&mut self, op: PendingOp) -> bool {
        self.pending.remove(&op).is_some()
    }

    /// Drop deltas whose deadline has passed. Returns how many were dropped.
    pub fn expire(&mut self, now: u64) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, op| op.deadline > now);
        let expired = before - self.pending.len();
        if expired > 0 {
            warn!(account = %self.account_id, expired, "tentative balance changes timed out");
        }
        expired
    }

    /// Replace the base with the balance committed as `revision` and drop the deltas it
    /// includes. Returns `false` (changing nothing) when `revision` is not newer than the base.
    pub fn on_authoritative(&mut self, balance: Balance, revision: u64) -> bool {
        if revision <= self.revision {
            debug!(
                account = %self.account_id,
                revision,
                current = self.revision,
                "stale balance ignored"
            );
            return false;
        }
        self.authoritative = balance;
        self.revision = revision;
        self.pending
            .retain(|_, op| op.committed_at.map_or(true, |committed| committed > revision));
        debug!(
            account = %self.account_id,
            %balance,
            revision,
            pending = self.pending.len(),
            "authoritative balance received"
        );
        true
    }

    /// Feed a change event; returns whether it advanced this account's balance.
    pub fn observe(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Account(account) if account.id == self.account_id => {
                self.on_authoritative(account.balance(self.mode), account.revision)
            }
            _ => false,
        }
    }
}

/// A [`TentativeBalance`] shared by the task placing bets and the task following the feed.
#[derive(Clone, Debug)]
pub struct SharedBalance(Arc<Mutex<TentativeBalance>>);

impl SharedBalance {
    pub fn new(balance: TentativeBalance) -> Self {
        Self(Arc::new(Mutex::new(balance)))
    }

    pub fn lock(&self) -> MutexGuard<'_, TentativeBalance> {
        match self.0.lock() {
            Ok(balance) => balance,
            Err(poisoned) => {
                warn!("tentative balance lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feed::UpdatesFilter,
        mocks::{account_id, seeded_ledger, GENESIS_MS},
    };
    use plinko_types::{Amount, BoardConfig};

    fn tentative() -> TentativeBalance {
        let account = Account::new(account_id("alice"), 0);
        TentativeBalance::new(&account, GameMode::Demo)
    }

    #[test]
    fn failure_rolls_back_to_authoritative() {
        let mut balance = tentative();
        let op = balance.apply_tentative(-10_000, 5_000);
        assert_eq!(balance.displayed(), Balance::from_units(900));
        assert!(balance.fail(op));
        assert_eq!(balance.displayed(), Balance::from_units(1_000));
        assert!(!balance.fail(op));
    }

    #[test]
    fn confirmed_deltas_wait_for_their_revision() {
        let mut balance = tentative();
        let bet = balance.apply_tentative(-10_000, 5_000);
        let other = balance.apply_tentative(-5_000, 5_000);
        assert!(balance.confirm(bet, 2));
        assert_eq!(balance.displayed(), Balance::from_units(850));

        // Revision 1 predates the bet's debit.
        assert!(balance.on_authoritative(Balance::from_units(1_000), 1));
        assert_eq!(balance.pending(), 2);

        assert!(balance.on_authoritative(Balance::from_units(900), 2));
        assert_eq!(balance.pending(), 1);
        assert_eq!(balance.displayed(), Balance::from_units(850));
        assert!(balance.fail(other));
        assert_eq!(balance.displayed(), Balance::from_units(900));
    }

    #[test]
    fn late_balances_never_win() {
        let mut balance = tentative();
        assert!(balance.on_authoritative(Balance::from_units(800), 3));
        assert!(!balance.on_authoritative(Balance::from_units(900), 2));
        assert!(!balance.on_authoritative(Balance::from_units(900), 3));
        assert_eq!(balance.authoritative(), Balance::from_units(800));
        assert_eq!(balance.revision(), 3);
    }

    #[test]
    fn confirming_after_the_balance_arrived_drops_the_delta() {
        let mut balance = tentative();
        let op = balance.apply_tentative(-10_000, 5_000);
        assert!(balance.on_authoritative(Balance::from_units(900), 4));
        assert_eq!(balance.displayed(), Balance::from_units(800));
        assert!(balance.confirm(op, 4));
        assert_eq!(balance.pending(), 0);
        assert_eq!(balance.displayed(), Balance::from_units(900));
    }

    #[test]
    fn stale_deltas_expire() {
        let mut balance = tentative();
        balance.apply_tentative(-10_000, 1_000);
        balance.apply_tentative(-10_000, 3_000);
        assert_eq!(balance.expire(999), 0);
        assert_eq!(balance.expire(1_000), 1);
        assert_eq!(balance.displayed(), Balance::from_units(900));
        assert_eq!(balance.expire(10_000), 1);
        assert_eq!(balance.displayed(), balance.authoritative());
    }

    #[tokio::test]
    async fn follows_the_change_feed() {
        let ledger = seeded_ledger().await;
        let player = account_id("bob");
        let account = ledger.account(&player).await.unwrap();
        let mut balance = TentativeBalance::new(&account, GameMode::Demo);
        let mut feed = ledger.subscribe(UpdatesFilter::Account(player.clone()));

        let stake = Amount::from_units(250);
        let op = balance.apply_tentative(-stake.signed(), GENESIS_MS + 5_000);
        let handle = ledger
            .place_bet(&player, stake, GameMode::Demo, BoardConfig::default())
            .await
            .unwrap();

        // The feed delivers the debit before the caller hears back.
        let event = feed.recv().await.unwrap();
        assert!(balance.observe(&event));
        assert_eq!(balance.authoritative(), Balance::from_units(750));
        assert!(balance.confirm(op, handle.revision));
        assert_eq!(balance.pending(), 0);
        assert_eq!(balance.displayed(), Balance::from_units(750));
    }

    #[tokio::test]
    async fn confirmed_before_the_feed_catches_up() {
        let ledger = seeded_ledger().await;
        let player = account_id("cleo");
        let account = ledger.account(&player).await.unwrap();
        let mut balance = TentativeBalance::new(&account, GameMode::Demo);
        let mut feed = ledger.subscribe(UpdatesFilter::Account(player.clone()));

        let stake = Amount::from_units(100);
        let op = balance.apply_tentative(-stake.signed(), GENESIS_MS + 5_000);
        let handle = ledger
            .place_bet(&player, stake, GameMode::Demo, BoardConfig::default())
            .await
            .unwrap();
        assert!(balance.confirm(op, handle.revision));
        assert_eq!(balance.displayed(), Balance::from_units(900));

        let event = feed.recv().await.unwrap();
        assert!(balance.observe(&event));
        assert_eq!(balance.pending(), 0);
        assert_eq!(balance.displayed(), Balance::from_units(900));
    }
}
