//! Automatic bet sequencing.
//!
//! Runs stake, drop and settle cycles back to back. Stop conditions are checked only between
//! cycles, so a cycle that has started always finishes.

use plinko_types::{
    validation::validate_stake, AccountId, Amount, Balance, BoardConfig, GameMode, PayoutCurve,
};
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    curve::curve_for,
    drop::{DropSimulator, Landing},
    ledger::{Error, Ledger, Settlement},
    reconcile::SharedBalance,
    state::State,
};

/// How long a stake shown as debited may wait for the ledger to confirm it.
const TENTATIVE_STAKE_MS: u64 = 30_000;

/// Anything that turns a curve into a landing.
pub trait DropSource: Send {
    fn drop_on(&mut self, curve: &PayoutCurve) -> impl Future<Output = Option<Landing>> + Send;
}

impl DropSource for DropSimulator {
    async fn drop_on(&mut self, curve: &PayoutCurve) -> Option<Landing> {
        self.resolve(curve).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencerConfig {
    pub stake: Amount,
    /// Cycles to run; `0` runs until funds run out or a stop is requested.
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub board: BoardConfig,
    /// Pause between rows of each drop.
    #[serde(default, with = "millis")]
    pub row_delay: Duration,
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Requests a sequence to stop at its next cycle boundary.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    CountReached,
    InsufficientFunds,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencerReport {
    pub cycles: u64,
    /// Cycles whose drop produced no outcome.
    pub unresolved: u64,
    pub staked: Amount,
    pub paid: Amount,
    pub reason: StopReason,
    pub final_balance: Balance,
}

pub struct Sequencer<D: DropSource = DropSimulator> {
    config: SequencerConfig,
    drops: D,
    stop: StopHandle,
    display: Option<SharedBalance>,
}

impl Sequencer<DropSimulator> {
    /// Sequencer drawing drops from `simulator`, paced by the configured row delay.
    pub fn new(config: SequencerConfig, simulator: DropSimulator) -> Self {
        let simulator = simulator.with_row_delay(config.row_delay);
        Self::with_source(config, simulator)
    }
}

impl<D: DropSource> Sequencer<D> {
    pub fn with_source(config: SequencerConfig, drops: D) -> Self {
        Self {
            config,
            drops,
            stop: StopHandle::default(),
            display: None,
        }
    }

    /// Show every stake on `display` as a tentative debit until the ledger answers.
    pub fn with_display(mut self, display: SharedBalance) -> Self {
        self.display = Some(display);
        self
    }

    /// Observe `stop` instead of a private handle.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn boundary_stop(&self, cycles: u64, balance: Balance) -> Option<StopReason> {
        if self.stop.is_stopped() {
            Some(StopReason::Stopped)
        } else if self.config.count != 0 && cycles >= self.config.count {
            Some(StopReason::CountReached)
        } else if !balance.covers(self.config.stake) {
            Some(StopReason::InsufficientFunds)
        } else {
            None
        }
    }

    pub async fn run<S: State, C: Clock>(
        &mut self,
        ledger: &Ledger<S, C>,
        account_id: &AccountId,
    ) -> Result<SequencerReport, Error> {
        validate_stake(self.config.stake)?;
        let curve = curve_for(self.config.board)?;
        let (stake, mode) = (self.config.stake, self.config.mode);

        let mut report = SequencerReport {
            cycles: 0,
            unresolved: 0,
            staked: Amount::ZERO,
            paid: Amount::ZERO,
            reason: StopReason::Stopped,
            final_balance: ledger.account(account_id).await?.balance(mode),
        };
        info!(
            account = %account_id,
            %stake,
            count = self.config.count,
            rows = curve.rows(),
            risk = %self.config.board.risk(),
            "sequence started"
        );

        loop {
            if let Some(reason) = self.boundary_stop(report.cycles, report.final_balance) {
                report.reason = reason;
                break;
            }
            let pending = self.display.as_ref().map(|display| {
                display
                    .lock()
                    .apply_tentative(-stake.signed(), ledger.now() + TENTATIVE_STAKE_MS)
            });
            let placed = ledger
                .place_bet(account_id, stake, mode, self.config.board)
                .await;
            if let (Some(display), Some(op)) = (&self.display, pending) {
                let mut display = display.lock();
                match &placed {
                    Ok(handle) => display.confirm(op, handle.revision),
                    Err(_) => display.fail(op),
                };
                display.expire(ledger.now());
            }
            let handle = match placed {
                Ok(handle) => handle,
                // The balance moved between the boundary check and the debit.
                Err(Error::InsufficientFunds { balance, .. }) => {
                    report.final_balance = balance;
                    report.reason = StopReason::InsufficientFunds;
                    break;
                }
                Err(err) => return Err(err),
            };
            report.cycles += 1;
            report.staked = report.staked.saturating_add(stake);
            report.final_balance = handle.balance_after;

            let Some(landing) = self.drops.drop_on(&curve).await else {
                warn!(bet = %handle.bet_id, "drop ended without an outcome");
                report.unresolved += 1;
                continue;
            };
            let event = landing.outcome(&handle);
            match ledger.settle(&event).await? {
                Settlement::Applied { record, balance } => {
                    report.paid = report.paid.saturating_add(record.payout);
                    if let Some(balance) = balance {
                        report.final_balance = balance;
                    }
                }
                Settlement::AlreadySettled => {
                    warn!(bet = %handle.bet_id, "fresh bet reported as already settled");
                }
            }
            debug!(
                cycle = report.cycles,
                bucket = event.bucket,
                balance = %report.final_balance,
                "cycle complete"
            );
        }

        info!(
            account = %account_id,
            cycles = report.cycles,
            staked = %report.staked,
            paid = %report.paid,
            reason = ?report.reason,
            balance = %report.final_balance,
            "sequence finished"
        );
        Ok(report)
    }
}
