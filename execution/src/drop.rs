//! Drop simulation.
//!
//! A token starts above the centre of the board and is deflected once per row. Away from the
//! centre line it drifts back with probability `0.5 + bias`; on the centre line it goes either way
//! with even odds. The bucket is the number of rightward deflections.

use plinko_types::{BetHandle, Multiplier, OutcomeEvent, PayoutCurve, ValidationError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::debug;

pub const DEFAULT_CENTER_BIAS: f64 = 0.02;
pub const MAX_CENTER_BIAS: f64 = 0.25;

/// Extra probability of drifting back towards the centre line.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct CenterBias(f64);

impl CenterBias {
    pub const NONE: CenterBias = CenterBias(0.0);

    pub fn new(bias: f64) -> Result<Self, ValidationError> {
        if !(0.0..=MAX_CENTER_BIAS).contains(&bias) {
            return Err(ValidationError::CenterBiasOutOfRange(bias));
        }
        Ok(Self(bias))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Probability of a rightward deflection at lateral `offset` (`2 * rights - row`).
    fn right_probability(self, offset: i32) -> f64 {
        match offset.signum() {
            1 => 0.5 - self.0,
            -1 => 0.5 + self.0,
            _ => 0.5,
        }
    }
}

impl Default for CenterBias {
    fn default() -> Self {
        Self(DEFAULT_CENTER_BIAS)
    }
}

impl TryFrom<f64> for CenterBias {
    type Error = ValidationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        CenterBias::new(value)
    }
}

impl From<CenterBias> for f64 {
    fn from(bias: CenterBias) -> Self {
        bias.0
    }
}

/// Where a token came to rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Landing {
    pub bucket: usize,
    pub multiplier: Multiplier,
}

impl Landing {
    pub fn outcome(self, bet: &BetHandle) -> OutcomeEvent {
        OutcomeEvent {
            bet_id: bet.bet_id,
            account_id: bet.account_id.clone(),
            stake: bet.stake,
            bucket: self.bucket,
            multiplier: self.multiplier,
        }
    }
}

/// Cancels a token from another task.
#[derive(Clone, Debug, Default)]
pub struct DropCanceller(Arc<AtomicBool>);

impl DropCanceller {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One token in flight.
#[derive(Debug)]
pub struct DropToken {
    rows: u8,
    row: u8,
    rights: u8,
    bias: CenterBias,
    processed: bool,
    canceller: DropCanceller,
}

impl DropToken {
    pub fn new(rows: u8, bias: CenterBias) -> Self {
        Self {
            rows,
            row: 0,
            rights: 0,
            bias,
            processed: false,
            canceller: DropCanceller::default(),
        }
    }

    pub fn canceller(&self) -> DropCanceller {
        self.canceller.clone()
    }

    /// Rows resolved so far.
    pub fn row(&self) -> u8 {
        self.row
    }

    /// Lateral position in half-peg units, 0 on the centre line.
    pub fn offset(&self) -> i32 {
        2 * i32::from(self.rights) - i32::from(self.row)
    }

    pub fn is_processed(&self) -> bool {
        self.processed || self.canceller.is_cancelled()
    }

    pub fn is_at_rest(&self) -> bool {
        self.row >= self.rows
    }

    /// Resolve the next row. Returns `false` once the token is at rest or removed.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.is_processed() || self.is_at_rest() {
            return false;
        }
        if rng.gen_bool(self.bias.right_probability(self.offset())) {
            self.rights += 1;
        }
        self.row += 1;
        true
    }

    /// Emit the landing exactly once; later calls (or calls on a removed token) yield nothing.
    pub fn land(&mut self, curve: &PayoutCurve) -> Option<Landing> {
        if self.is_processed() || !self.is_at_rest() {
            return None;
        }
        self.processed = true;
        let bucket = usize::from(self.rights);
        let multiplier = curve.get(bucket)?;
        Some(Landing { bucket, multiplier })
    }

    /// Remove the token without emitting an outcome.
    pub fn cancel(&mut self) {
        self.processed = true;
        self.canceller.cancel();
    }
}

/// Drive `token` to rest, yielding once per row.
///
/// Returns `None` if the token was cancelled or had already landed.
pub async fn resolve_drop<R: Rng + ?Sized>(
    token: &mut DropToken,
    curve: &PayoutCurve,
    rng: &mut R,
    row_delay: Duration,
) -> Option<Landing> {
    while token.step(rng) {
        if row_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(row_delay).await;
        }
    }
    let landing = token.land(curve);
    match landing {
        Some(landing) => debug!(
            bucket = landing.bucket,
            multiplier = %landing.multiplier,
            "token landed"
        ),
        None => debug!(row = token.row(), "token removed without outcome"),
    }
    landing
}

/// Seeded source of drops.
pub struct DropSimulator {
    rng: ChaCha20Rng,
    bias: CenterBias,
    row_delay: Duration,
}

impl DropSimulator {
    pub fn new(seed: u64) -> Self {
        Self::from_rng(ChaCha20Rng::seed_from_u64(seed))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_rng(ChaCha20Rng::from_seed(seed))
    }

    fn from_rng(rng: ChaCha20Rng) -> Self {
        Self {
            rng,
            bias: CenterBias::default(),
            row_delay: Duration::ZERO,
        }
    }

    pub fn with_bias(mut self, bias: CenterBias) -> Self {
        self.bias = bias;
        self
    }

    pub fn with_row_delay(mut self, row_delay: Duration) -> Self {
        self.row_delay = row_delay;
        self
    }

    pub fn bias(&self) -> CenterBias {
        self.bias
    }

    pub fn token(&self, curve: &PayoutCurve) -> DropToken {
        DropToken::new(curve.rows(), self.bias)
    }

    /// Resolve a fresh token on `curve`.
    pub async fn resolve(&mut self, curve: &PayoutCurve) -> Option<Landing> {
        let mut token = self.token(curve);
        self.resolve_token(&mut token, curve).await
    }

    /// Resolve a caller-owned token (which may be cancelled through its canceller).
    pub async fn resolve_token(
        &mut self,
        token: &mut DropToken,
        curve: &PayoutCurve,
    ) -> Option<Landing> {
        resolve_drop(token, curve, &mut self.rng, self.row_delay).await
    }
}

/// Walk a token without suspension and return its bucket.
pub fn sample_bucket<R: Rng + ?Sized>(rows: u8, bias: CenterBias, rng: &mut R) -> usize {
    let mut token = DropToken::new(rows, bias);
    while token.step(rng) {}
    usize::from(token.rights)
}

/// Exact bucket probabilities for `rows` rows.
pub fn outcome_distribution(rows: u8, bias: CenterBias) -> Vec<f64> {
    let mut probabilities = vec![0.0; usize::from(rows) + 1];
    probabilities[0] = 1.0;
    for row in 0..i32::from(rows) {
        let mut next = vec![0.0; probabilities.len()];
        for (rights, &p) in probabilities.iter().enumerate().take(row as usize + 1) {
            if p == 0.0 {
                continue;
            }
            let right = bias.right_probability(2 * rights as i32 - row);
            next[rights] += p * (1.0 - right);
            next[rights + 1] += p * right;
        }
        probabilities = next;
    }
    probabilities
}

/// Expected payout per unit staked.
pub fn expected_return(curve: &PayoutCurve, bias: CenterBias) -> f64 {
    outcome_distribution(curve.rows(), bias)
        .iter()
        .zip(curve.multipliers())
        .map(|(p, m)| p * m.as_f64())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::generate_curve;
    use plinko_types::{
        AccountId, Amount, Balance, BetId, BoardConfig, GameMode, RiskLevel, MAX_ROWS, MIN_ROWS,
    };

    #[test]
    fn bias_range_is_enforced() {
        assert!(CenterBias::new(0.0).is_ok());
        assert!(CenterBias::new(0.25).is_ok());
        assert_eq!(
            CenterBias::new(0.3),
            Err(ValidationError::CenterBiasOutOfRange(0.3))
        );
        assert!(CenterBias::new(-0.01).is_err());
        assert!(CenterBias::new(f64::NAN).is_err());
    }

    #[test]
    fn distribution_sums_to_one_and_is_symmetric() {
        for rows in MIN_ROWS..=MAX_ROWS {
            let dist = outcome_distribution(rows, CenterBias::default());
            let total: f64 = dist.iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
            for i in 0..dist.len() {
                assert!((dist[i] - dist[dist.len() - 1 - i]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn unbiased_distribution_is_binomial() {
        let dist = outcome_distribution(8, CenterBias::NONE);
        let expected = [1.0, 8.0, 28.0, 56.0, 70.0, 56.0, 28.0, 8.0, 1.0];
        for (p, c) in dist.iter().zip(expected) {
            assert!((p - c / 256.0).abs() < 1e-12);
        }
    }

    #[test]
    fn every_curve_carries_a_house_edge() {
        for rows in MIN_ROWS..=MAX_ROWS {
            for risk in RiskLevel::ALL {
                let curve = generate_curve(rows, risk).unwrap();
                let rtp = expected_return(&curve, CenterBias::default());
                assert!(rtp < 1.0, "rows={rows} risk={risk} rtp={rtp}");
                assert!(rtp > 0.9, "rows={rows} risk={risk} rtp={rtp}");
            }
        }
    }

    #[test]
    fn same_seed_same_buckets() {
        let mut a = ChaCha20Rng::seed_from_u64(7);
        let mut b = ChaCha20Rng::seed_from_u64(7);
        let first: Vec<_> = (0..64)
            .map(|_| sample_bucket(16, CenterBias::default(), &mut a))
            .collect();
        let second: Vec<_> = (0..64)
            .map(|_| sample_bucket(16, CenterBias::default(), &mut b))
            .collect();
        assert_eq!(first, second);
        assert!(first.iter().all(|&bucket| bucket <= 16));
    }

    #[test]
    fn land_emits_exactly_once() {
        let curve = generate_curve(8, RiskLevel::Medium).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut token = DropToken::new(8, CenterBias::default());
        assert_eq!(token.land(&curve), None);
        let mut steps = 0;
        while token.step(&mut rng) {
            steps += 1;
        }
        assert_eq!(steps, 8);
        let landing = token.land(&curve).unwrap();
        assert_eq!(curve.get(landing.bucket), Some(landing.multiplier));
        assert_eq!(token.land(&curve), None);
        assert!(!token.step(&mut rng));
    }

    #[test]
    fn cancelled_token_emits_nothing() {
        let curve = generate_curve(8, RiskLevel::Low).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let mut token = DropToken::new(8, CenterBias::default());
        token.step(&mut rng);
        token.cancel();
        assert!(!token.step(&mut rng));
        assert_eq!(token.land(&curve), None);
    }

    #[tokio::test]
    async fn canceller_stops_an_inflight_drop() {
        let curve = generate_curve(16, RiskLevel::High).unwrap();
        let mut simulator = DropSimulator::new(3);
        let mut token = simulator.token(&curve);
        token.canceller().cancel();
        assert_eq!(simulator.resolve_token(&mut token, &curve).await, None);
        assert_eq!(token.row(), 0);
    }

    #[tokio::test]
    async fn simulator_landing_builds_outcome() {
        let curve = generate_curve(12, RiskLevel::High).unwrap();
        let mut simulator = DropSimulator::new(11);
        let landing = simulator.resolve(&curve).await.unwrap();
        let handle = BetHandle {
            bet_id: BetId(4),
            account_id: AccountId::new("player").unwrap(),
            stake: Amount::from_units(10),
            mode: GameMode::Demo,
            board: BoardConfig::new(12, RiskLevel::High).unwrap(),
            balance_after: Balance::from_units(990),
            revision: 2,
        };
        let event = landing.outcome(&handle);
        assert_eq!(event.bucket, landing.bucket);
        assert_eq!(event.payout(), landing.multiplier.payout(Amount::from_units(10)));
    }

    #[test]
    fn sampled_frequencies_track_distribution() {
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let rows = 10;
        let trials = 50_000;
        let mut counts = vec![0usize; usize::from(rows) + 1];
        for _ in 0..trials {
            counts[sample_bucket(rows, CenterBias::default(), &mut rng)] += 1;
        }
        let dist = outcome_distribution(rows, CenterBias::default());
        for (count, p) in counts.iter().zip(dist) {
            let observed = *count as f64 / trials as f64;
            assert!((observed - p).abs() < 0.01, "observed {observed} expected {p}");
        }
    }
}
