//! Test doubles: a manual clock, a store that injects write conflicts, drops that never land and a
//! seeded ledger.

use crate::{
    clock::Clock,
    drop::{resolve_drop, CenterBias, DropToken, Landing},
    ledger::Ledger,
    sequencer::DropSource,
    state::{Batch, CommitError, Memory, Record, State},
};
use anyhow::Result;
use plinko_types::{AccountId, Key, KeyKind, PaymentMethodKind, PayoutCurve, SequenceKind};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

/// Administrator configured on [`seeded_ledger`].
pub const ADMIN: &str = "admin";

/// Start time used by [`seeded_ledger`] (unix milliseconds).
pub const GENESIS_MS: u64 = 1_700_000_000_000;

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self(AtomicU64::new(now_ms))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wraps a store and rejects the next `n` non-empty commits as conflicts.
pub struct FlakyState<S> {
    inner: S,
    remaining: AtomicUsize,
    injected: AtomicUsize,
}

impl<S: State> FlakyState<S> {
    pub fn new(inner: S, conflicts: usize) -> Self {
        Self {
            inner,
            remaining: AtomicUsize::new(conflicts),
            injected: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `conflicts` commits that touch any record.
    pub fn inject(&self, conflicts: usize) {
        self.remaining.store(conflicts, Ordering::SeqCst);
    }

    pub fn conflicts_injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: State> State for FlakyState<S> {
    async fn get(&self, key: &Key) -> Result<Option<Record>> {
        self.inner.get(key).await
    }

    async fn scan(&self, kind: KeyKind) -> Result<Vec<(Key, Record)>> {
        self.inner.scan(kind).await
    }

    async fn commit(&self, batch: Batch) -> Result<(), CommitError> {
        let contested = batch
            .writes()
            .keys()
            .chain(batch.reads().keys())
            .next()
            .cloned();
        if let Some(key) = contested {
            if self.take_conflict() {
                self.injected.fetch_add(1, Ordering::SeqCst);
                return Err(CommitError::Conflict(key));
            }
        }
        self.inner.commit(batch).await
    }

    async fn allocate(&self, kind: SequenceKind) -> Result<u64> {
        self.inner.allocate(kind).await
    }
}

pub fn account_id(id: &str) -> AccountId {
    AccountId::new(id).expect("valid account id")
}

/// Configure [`ADMIN`] and the `bkash`/`nagad` (enabled) and `rocket` (disabled) methods.
pub async fn seed<S: State, C: Clock>(ledger: Ledger<S, C>) -> Ledger<S, C> {
    let ledger = ledger.with_admins([account_id(ADMIN)]);
    {
        let admin = ledger.admin(&account_id(ADMIN)).expect("admin configured");
        for (name, number, enabled) in [
            ("bkash", "01700000001", true),
            ("nagad", "01800000002", true),
            ("rocket", "01900000003", false),
        ] {
            admin
                .add_payment_method(name, number, PaymentMethodKind::MobileBanking, enabled)
                .await
                .expect("seed payment method");
        }
    }
    ledger
}

/// An in-memory ledger at [`GENESIS_MS`] with [`seed`] applied.
pub async fn seeded_ledger() -> Ledger<Memory, ManualClock> {
    seed(Ledger::with_clock(Memory::new(), ManualClock::new(GENESIS_MS))).await
}

/// Every drop is removed before it lands.
pub struct CancelledDrops;

impl DropSource for CancelledDrops {
    async fn drop_on(&mut self, curve: &PayoutCurve) -> Option<Landing> {
        let mut token = DropToken::new(curve.rows(), CenterBias::default());
        token.cancel();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        resolve_drop(&mut token, curve, &mut rng, Duration::ZERO).await
    }
}
