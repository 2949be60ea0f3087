//! Local HTTP backend for plinko.
//!
//! Wraps a [`Ledger`] over the in-memory store and exposes player and administrator operations
//! through [`Api`]. Drops are resolved on the server from a seeded generator so that every
//! settlement is derived from an outcome the server produced itself.

use anyhow::{Context, Result};
use plinko_execution::{
    curve_for, CenterBias, DropSimulator, Error, Ledger, Memory, Settlement, UpdatesFilter,
};
use plinko_types::{
    AccountId, Amount, Balance, BetHandle, BoardConfig, GameMode, Multiplier, PaymentMethodKind,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tracing::{info, warn};

mod api;

pub use api::Api;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Accounts allowed to call `/admin` routes.
    pub admins: Vec<AccountId>,
    /// Seed for drop resolution; drawn from the OS when absent.
    pub seed: Option<u64>,
    pub center_bias: CenterBias,
    /// Pause between rows of each drop.
    pub row_delay_ms: u64,
    /// Ledger state is restored from and saved to this file.
    pub snapshot_path: Option<PathBuf>,
    pub http_body_limit_bytes: Option<usize>,
    /// Browser origins allowed by CORS (`*` allows any).
    pub allowed_origins: Vec<String>,
    /// Payment methods created at startup when no method of that name exists.
    pub payment_methods: Vec<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            seed: None,
            center_bias: CenterBias::default(),
            row_delay_ms: 0,
            snapshot_path: None,
            http_body_limit_bytes: Some(64 * 1024),
            allowed_origins: Vec::new(),
            payment_methods: Vec::new(),
        }
    }
}

/// A bet request from the UI.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub stake: Amount,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub board: BoardConfig,
}

/// One settled drop.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Play {
    pub bet: BetHandle,
    /// Absent when the drop ended without an outcome.
    pub bucket: Option<usize>,
    pub multiplier: Option<Multiplier>,
    pub payout: Amount,
    pub balance: Balance,
}

pub struct Backend {
    pub config: ServerConfig,
    ledger: Ledger<Memory>,
    seeds: Mutex<ChaCha20Rng>,
}

impl Backend {
    pub fn new(config: ServerConfig, memory: Memory) -> Self {
        let seeds = match config.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };
        let ledger = Ledger::new(memory).with_admins(config.admins.iter().cloned());
        Self {
            config,
            ledger,
            seeds: Mutex::new(seeds),
        }
    }

    /// Restore the ledger from the configured snapshot, if it exists.
    pub fn load(config: ServerConfig) -> Result<Self> {
        let memory = match &config.snapshot_path {
            Some(path) => load_snapshot(path)?,
            None => Memory::new(),
        };
        Ok(Self::new(config, memory))
    }

    pub fn ledger(&self) -> &Ledger<Memory> {
        &self.ledger
    }

    /// Create configured payment methods that do not exist yet.
    pub async fn seed_payment_methods(&self) -> Result<()> {
        let Some(admin_id) = self.config.admins.first() else {
            if !self.config.payment_methods.is_empty() {
                warn!("payment methods configured without an administrator; skipping");
            }
            return Ok(());
        };
        let admin = self.ledger.admin(admin_id)?;
        let existing = self.ledger.payment_methods(false).await?;
        for (name, number) in &self.config.payment_methods {
            if existing.iter().any(|method| method.matches(name)) {
                continue;
            }
            admin
                .add_payment_method(name, number, PaymentMethodKind::MobileBanking, true)
                .await
                .with_context(|| format!("could not add payment method {name}"))?;
        }
        Ok(())
    }

    fn simulator(&self) -> DropSimulator {
        let seed = self
            .seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen::<u64>();
        DropSimulator::new(seed)
            .with_bias(self.config.center_bias)
            .with_row_delay(Duration::from_millis(self.config.row_delay_ms))
    }

    /// Stake, drop and settle one bet.
    ///
    /// The drop runs on its own task so a dropped request still settles the stake it debited.
    pub async fn play(
        self: &Arc<Self>,
        account_id: &AccountId,
        request: PlayRequest,
    ) -> Result<Play, Error> {
        let curve = curve_for(request.board)?;
        let bet = self
            .ledger
            .place_bet(account_id, request.stake, request.mode, request.board)
            .await?;

        let backend = Arc::clone(self);
        let handle = bet.clone();
        let task = tokio::spawn(async move {
            let mut simulator = backend.simulator();
            let Some(landing) = simulator.resolve(&curve).await else {
                return Ok((None, None));
            };
            let settlement = backend.ledger.settle(&landing.outcome(&handle)).await?;
            Ok::<_, Error>((Some(landing), Some(settlement)))
        });
        let (landing, settlement) = task
            .await
            .map_err(|err| Error::Storage(anyhow::anyhow!("drop task failed: {err}")))??;

        let (payout, balance) = match settlement {
            Some(Settlement::Applied { record, balance }) => {
                (record.payout, balance.unwrap_or(bet.balance_after))
            }
            Some(Settlement::AlreadySettled) | None => (Amount::ZERO, bet.balance_after),
        };
        if landing.is_none() {
            warn!(account = %account_id, bet = %bet.bet_id, "drop ended without an outcome");
        }
        Ok(Play {
            bucket: landing.map(|landing| landing.bucket),
            multiplier: landing.map(|landing| landing.multiplier),
            payout,
            balance,
            bet,
        })
    }

    /// Write the ledger to the configured snapshot file.
    pub async fn save(&self) -> Result<Option<PathBuf>> {
        let Some(path) = &self.config.snapshot_path else {
            return Ok(None);
        };
        let bytes = self.ledger.state().snapshot().await;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("could not write snapshot {}", path.display()))?;
        info!(path = %path.display(), "snapshot saved");
        Ok(Some(path.clone()))
    }

    /// Number of live change-feed subscribers across all filters.
    pub fn subscribers(&self) -> usize {
        self.ledger.feed().subscriber_count()
    }

    /// Log every committed change at debug level until the feed closes.
    pub fn spawn_change_log(&self) -> tokio::task::JoinHandle<()> {
        let mut updates = self.ledger.subscribe(UpdatesFilter::All);
        tokio::spawn(async move {
            while let Some(event) = updates.recv().await {
                tracing::debug!(
                    account = ?event.account().map(|id| id.to_string()),
                    ?event,
                    "change"
                );
            }
        })
    }
}

fn load_snapshot(path: &Path) -> Result<Memory> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let memory = Memory::restore(&bytes)
                .with_context(|| format!("could not restore snapshot {}", path.display()))?;
            info!(path = %path.display(), "snapshot restored");
            Ok(memory)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Memory::new()),
        Err(err) => Err(err).with_context(|| format!("could not read snapshot {}", path.display())),
    }
}
