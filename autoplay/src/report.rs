use plinko_execution::{
    curve::curve_for,
    drop::{expected_return, sample_bucket},
    CenterBias,
};
use plinko_types::{BoardConfig, Multiplier, RiskLevel, ValidationError, MAX_ROWS, MIN_ROWS};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::Serialize;

/// Return to player for one board.
#[derive(Clone, Debug, Serialize)]
pub struct RiskReport {
    pub rows: u8,
    pub risk: RiskLevel,
    pub center: Multiplier,
    pub edge: Multiplier,
    /// Exact expected payout per unit staked.
    pub analytic: f64,
    /// Mean payout per unit staked over `samples` simulated drops.
    pub simulated: f64,
    pub samples: u64,
}

impl RiskReport {
    pub fn house_edge(&self) -> f64 {
        1.0 - self.analytic
    }
}

/// Analytic and Monte Carlo return for every supported board, simulated in parallel.
pub fn house_edge_report(
    samples: u64,
    seed: u64,
    bias: CenterBias,
) -> Result<Vec<RiskReport>, ValidationError> {
    let boards = (MIN_ROWS..=MAX_ROWS)
        .flat_map(|rows| RiskLevel::ALL.map(|risk| BoardConfig::new(rows, risk)))
        .collect::<Result<Vec<_>, _>>()?;

    boards
        .par_iter()
        .enumerate()
        .map(|(index, board)| {
            let curve = curve_for(*board)?;
            let mut rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(index as u64));
            let total: f64 = (0..samples)
                .map(|_| {
                    let bucket = sample_bucket(curve.rows(), bias, &mut rng);
                    curve.get(bucket).map_or(0.0, Multiplier::as_f64)
                })
                .sum();
            Ok(RiskReport {
                rows: board.rows(),
                risk: board.risk(),
                center: curve.get(curve.center_index()).unwrap_or_default(),
                edge: curve.get(0).unwrap_or_default(),
                analytic: expected_return(&curve, bias),
                simulated: if samples == 0 {
                    0.0
                } else {
                    total / samples as f64
                },
                samples,
            })
        })
        .collect()
}
