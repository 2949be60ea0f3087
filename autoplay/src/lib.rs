mod report;
mod tracker;

pub use report::{house_edge_report, RiskReport};

use anyhow::{Context, Result};
use futures::future::join_all;
use plinko_execution::{
    CenterBias, DropSimulator, Ledger, Memory, Sequencer, SequencerConfig, SequencerReport,
    SharedBalance, StopHandle, UpdatesFilter,
};
use plinko_types::{AccountId, AdjustDirection, Amount, Balance, GameMode};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::Notify;
use tracker::Tracker;
use tracing::{info, warn};

/// Administrator used to fund bots playing with real balances.
const FUNDING_ADMIN: &str = "autoplay-admin";

/// Configuration for the autoplay engine
pub struct EngineConfig {
    pub players: usize,
    pub seed: u64,
    pub center_bias: CenterBias,
    pub sequence: SequencerConfig,
    /// Real balance credited to each bot before it starts.
    pub fund: Option<Amount>,
}

/// Configuration for an autoplay run (from config file)
#[derive(Serialize, Deserialize)]
pub struct Config {
    pub players: usize,
    pub seed: u64,
    pub log_level: String,
    pub worker_threads: usize,
    pub sequence: SequencerConfig,
    #[serde(default)]
    pub center_bias: CenterBias,
    #[serde(default)]
    pub fund: Option<Amount>,
    /// Ledger state is restored from and saved to this file.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("could not parse config file {}", path.display()))
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            players: self.players,
            seed: self.seed,
            center_bias: self.center_bias,
            sequence: self.sequence.clone(),
            fund: self.fund,
        }
    }
}

/// Outcome of one engine run.
#[derive(Debug)]
pub struct Summary {
    pub reports: Vec<(AccountId, SequencerReport)>,
}

impl Summary {
    pub fn staked(&self) -> Amount {
        self.reports
            .iter()
            .fold(Amount::ZERO, |total, (_, report)| {
                total.saturating_add(report.staked)
            })
    }

    pub fn paid(&self) -> Amount {
        self.reports
            .iter()
            .fold(Amount::ZERO, |total, (_, report)| total.saturating_add(report.paid))
    }

    /// Realised return to player (paid / staked).
    pub fn return_to_player(&self) -> Option<f64> {
        let staked = self.staked();
        (!staked.is_zero()).then(|| self.paid().minor() as f64 / staked.minor() as f64)
    }
}

pub fn bot_id(index: usize) -> Result<AccountId> {
    AccountId::new(format!("bot-{index}")).context("invalid bot id")
}

/// Load ledger state from `path`, or start empty if the file does not exist.
pub fn load_state(path: &Path) -> Result<Memory> {
    match std::fs::read(path) {
        Ok(bytes) => Memory::restore(&bytes)
            .with_context(|| format!("could not restore snapshot {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Memory::new()),
        Err(err) => {
            Err(err).with_context(|| format!("could not read snapshot {}", path.display()))
        }
    }
}

pub async fn save_state(memory: &Memory, path: &Path) -> Result<()> {
    let bytes = memory.snapshot().await;
    std::fs::write(path, bytes)
        .with_context(|| format!("could not write snapshot {}", path.display()))
}

/// Main engine for running autoplay bots
pub struct Engine {
    config: EngineConfig,
    ledger: Ledger<Memory>,
    stop: StopHandle,
}

impl Engine {
    pub fn new(config: EngineConfig, memory: Memory) -> Result<Self> {
        let admin = AccountId::new(FUNDING_ADMIN)?;
        Ok(Self {
            config,
            ledger: Ledger::new(memory).with_admins([admin]),
            stop: StopHandle::default(),
        })
    }

    pub fn ledger(&self) -> &Ledger<Memory> {
        &self.ledger
    }

    /// Stops every bot at its next cycle boundary.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    async fn prepare(&self, tracker: &mut Tracker) -> Result<Vec<(AccountId, SharedBalance)>> {
        let mut bots = Vec::with_capacity(self.config.players);
        for index in 0..self.config.players {
            let id = bot_id(index)?;
            let mut account = self.ledger.account(&id).await?;
            if let Some(fund) = self.config.fund {
                let admin = self.ledger.admin(&AccountId::new(FUNDING_ADMIN)?)?;
                admin
                    .adjust_balance(&id, fund, AdjustDirection::Credit, None)
                    .await?;
                account = self.ledger.account(&id).await?;
            }
            if self.config.sequence.mode == GameMode::Demo {
                account = self.ledger.reset_demo_balance(&id).await?;
            }
            let display = tracker.add(&account, self.config.sequence.mode);
            bots.push((id, display));
        }
        Ok(bots)
    }

    pub async fn run(&self) -> Result<Summary> {
        let mut tracker = Tracker::default();
        let bots = self.prepare(&mut tracker).await?;
        info!(bots = bots.len(), "Initialized accounts");

        let mut updates = self.ledger.subscribe(UpdatesFilter::All);
        let done = Arc::new(Notify::new());
        let jobs = bots.iter().enumerate().map(|(index, (id, display))| {
            let simulator = DropSimulator::new(self.config.seed.wrapping_add(index as u64))
                .with_bias(self.config.center_bias);
            let mut sequencer = Sequencer::new(self.config.sequence.clone(), simulator)
                .with_stop(self.stop.clone())
                .with_display(display.clone());
            async move {
                let report = sequencer.run(&self.ledger, id).await;
                (id.clone(), report)
            }
        });
        let players = async {
            let results = join_all(jobs).await;
            done.notify_one();
            results
        };
        let watcher = async {
            loop {
                tokio::select! {
                    Some(event) = updates.recv() => tracker.apply(&event),
                    _ = done.notified() => break,
                }
            }
            while let Some(event) = updates.try_recv() {
                tracker.apply(&event);
            }
        };
        let (results, ()) = tokio::join!(players, watcher);
        tracker.log_stats();

        let mut reports = Vec::with_capacity(results.len());
        for (id, result) in results {
            let report = result?;
            if tracker.balance(&id) != Some(report.final_balance) {
                warn!(
                    account = %id,
                    tracked = ?tracker.balance(&id).map(|b| b.to_string()),
                    ledger = %report.final_balance,
                    "Tracked balance diverged from ledger"
                );
            }
            reports.push((id, report));
        }
        Ok(Summary { reports })
    }

    /// Balance of every bot, read from the ledger.
    pub async fn balances(&self) -> Result<Vec<(AccountId, Balance)>> {
        let mode = self.config.sequence.mode;
        let mut balances = Vec::with_capacity(self.config.players);
        for index in 0..self.config.players {
            let id = bot_id(index)?;
            let balance = self.ledger.account(&id).await?.balance(mode);
            balances.push((id, balance));
        }
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinko_execution::StopReason;
    use plinko_types::{BoardConfig, RiskLevel};
    use std::time::Duration;

    fn sequence(count: u64, mode: GameMode) -> SequencerConfig {
        SequencerConfig {
            stake: Amount::from_units(10),
            count,
            mode,
            board: BoardConfig::new(12, RiskLevel::Medium).unwrap(),
            row_delay: Duration::ZERO,
        }
    }

    fn engine(players: usize, sequence: SequencerConfig, fund: Option<Amount>) -> Engine {
        Engine::new(
            EngineConfig {
                players,
                seed: 11,
                center_bias: CenterBias::default(),
                sequence,
                fund,
            },
            Memory::new(),
        )
        .unwrap()
    }

    #[test]
    fn parses_yaml_config() {
        let config: Config = serde_yaml::from_str(
            r#"
players: 4
seed: 42
log_level: info
worker_threads: 2
sequence:
  stake: "5.50"
  count: 100
  mode: demo
  board:
    rows: 14
    risk: high
  rowDelay: 0
center_bias: 0.05
snapshot: /tmp/plinko.snapshot
"#,
        )
        .unwrap();
        assert_eq!(config.players, 4);
        assert_eq!(config.sequence.stake, Amount::from_minor(550));
        assert_eq!(config.sequence.board.rows(), 14);
        assert_eq!(config.center_bias.value(), 0.05);
        assert!(config.fund.is_none());
        assert_eq!(config.engine().sequence.count, 100);
    }

    #[test]
    fn rejects_out_of_range_bias() {
        let parsed: Result<Config, _> = serde_yaml::from_str(
            r#"
players: 1
seed: 1
log_level: info
worker_threads: 1
sequence:
  stake: 1
center_bias: 0.4
"#,
        );
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn every_bot_runs_its_count() {
        let engine = engine(3, sequence(20, GameMode::Demo), None);
        let summary = engine.run().await.unwrap();
        assert_eq!(summary.reports.len(), 3);
        for (_, report) in &summary.reports {
            assert_eq!(report.cycles, 20);
            assert_eq!(report.reason, StopReason::CountReached);
        }
        assert_eq!(summary.staked(), Amount::from_units(600));
        assert!(summary.return_to_player().is_some());

        let balances = engine.balances().await.unwrap();
        for ((id, balance), (report_id, report)) in balances.iter().zip(&summary.reports) {
            assert_eq!(id, report_id);
            assert_eq!(*balance, report.final_balance);
        }
    }

    #[tokio::test]
    async fn real_mode_bots_are_funded() {
        let engine = engine(2, sequence(0, GameMode::Real), Some(Amount::from_units(30)));
        let summary = engine.run().await.unwrap();
        for (_, report) in &summary.reports {
            assert_eq!(report.reason, StopReason::InsufficientFunds);
            assert!(report.cycles >= 3);
            assert!(report.final_balance < Balance::from_units(10));
        }
    }

    #[tokio::test]
    async fn stopped_engine_runs_nothing() {
        let engine = engine(2, sequence(0, GameMode::Demo), None);
        engine.stop_handle().stop();
        let summary = engine.run().await.unwrap();
        assert!(summary
            .reports
            .iter()
            .all(|(_, report)| report.cycles == 0 && report.reason == StopReason::Stopped));
        assert_eq!(summary.return_to_player(), None);
    }

    #[tokio::test]
    async fn state_survives_a_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.snapshot");
        assert!(load_state(&path).unwrap().is_empty().await);

        let engine = engine(1, sequence(5, GameMode::Demo), None);
        let summary = engine.run().await.unwrap();
        save_state(engine.ledger().state(), &path).await.unwrap();

        let restored = Engine::new(
            EngineConfig {
                players: 1,
                seed: 0,
                center_bias: CenterBias::default(),
                sequence: sequence(5, GameMode::Demo),
                fund: None,
            },
            load_state(&path).unwrap(),
        )
        .unwrap();
        let balances = restored.balances().await.unwrap();
        assert_eq!(balances[0].1, summary.reports[0].1.final_balance);
        let history = restored
            .ledger()
            .bet_history(&bot_id(0).unwrap())
            .await
            .unwrap();
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn corrupt_snapshots_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.snapshot");
        std::fs::write(&path, [0xff, 0x01, 0x02]).unwrap();
        assert!(load_state(&path).is_err());
    }
}
