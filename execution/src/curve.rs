//! Payout curve generation.
//!
//! Every `(rows, risk)` pair maps to a `(min_center, max_edge, exponent)` triple. Bucket values
//! grow from the centre to the edges along `t^exponent`, where `t` is the bucket's distance from
//! the centre measured in half-steps so odd boards stay exactly symmetric.

use plinko_types::{BoardConfig, Multiplier, PayoutCurve, RiskLevel, ValidationError, MIN_ROWS};

/// Edge multipliers for rows 8..=16, indexed by `[rows - 8][risk]`.
const MAX_EDGE: [[f64; 3]; 9] = [
    [4.8, 11.5, 26.0],
    [5.8, 14.0, 34.0],
    [6.0, 16.5, 43.0],
    [7.0, 19.0, 53.0],
    [7.2, 22.0, 65.0],
    [8.1, 25.0, 78.0],
    [8.5, 28.0, 94.0],
    [9.3, 31.0, 110.0],
    [9.7, 34.0, 128.0],
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveParams {
    pub min_center: f64,
    pub max_edge: f64,
    pub exponent: f64,
}

impl CurveParams {
    pub fn lookup(config: BoardConfig) -> Self {
        let (column, min_center, exponent) = match config.risk() {
            RiskLevel::Low => (0, 0.5, 2.0),
            RiskLevel::Medium => (1, 0.3, 3.0),
            RiskLevel::High => (2, 0.2, 4.5),
        };
        let row = usize::from(config.rows() - MIN_ROWS);
        Self {
            min_center,
            max_edge: MAX_EDGE[row][column],
            exponent,
        }
    }

    /// Raw (unrounded) value of `bucket` on a board with `rows` rows.
    pub fn value(&self, rows: u8, bucket: usize) -> f64 {
        let rows = i64::from(rows);
        let distance = (2 * bucket as i64 - rows).abs();
        if distance <= 1 {
            return self.min_center;
        }
        if distance >= rows {
            return self.max_edge;
        }
        let t = distance as f64 / rows as f64;
        self.min_center + (self.max_edge - self.min_center) * t.powf(self.exponent)
    }
}

/// Display rounding: whole numbers from 100, one decimal from 10, two decimals below.
pub fn round_for_display(value: f64) -> Multiplier {
    let hundredths = if value >= 100.0 {
        value.round() * 100.0
    } else if value >= 10.0 {
        (value * 10.0).round() * 10.0
    } else {
        (value * 100.0).round()
    };
    Multiplier::from_hundredths(hundredths.max(0.0) as u32)
}

/// Build the payout curve for a validated board.
pub fn curve_for(config: BoardConfig) -> Result<PayoutCurve, ValidationError> {
    let params = CurveParams::lookup(config);
    let multipliers = (0..config.buckets())
        .map(|bucket| round_for_display(params.value(config.rows(), bucket)))
        .collect();
    PayoutCurve::new(config, multipliers)
}

/// Validate `rows` and build the curve.
pub fn generate_curve(rows: u8, risk: RiskLevel) -> Result<PayoutCurve, ValidationError> {
    curve_for(BoardConfig::new(rows, risk)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinko_types::MAX_ROWS;
    use proptest::prelude::*;

    fn hundredths(curve: &PayoutCurve) -> Vec<u32> {
        curve.multipliers().iter().map(|m| m.hundredths()).collect()
    }

    #[test]
    fn eight_row_high_curve() {
        let curve = generate_curve(8, RiskLevel::High).unwrap();
        assert_eq!(
            hundredths(&curve),
            vec![2600, 727, 134, 25, 20, 25, 134, 727, 2600]
        );
    }

    #[test]
    fn sixteen_row_curves() {
        let high = generate_curve(16, RiskLevel::High).unwrap();
        assert_eq!(
            hundredths(&high),
            vec![
                12800, 7030, 3520, 1560, 585, 175, 45, 21, 20, 21, 45, 175, 585, 1560, 3520,
                7030, 12800
            ]
        );
        let low = generate_curve(16, RiskLevel::Low).unwrap();
        assert_eq!(low.get(0), Some(Multiplier::from_hundredths(970)));
        assert_eq!(low.get(8), Some(Multiplier::from_hundredths(50)));
    }

    #[test]
    fn odd_boards_share_the_center_value() {
        let curve = generate_curve(9, RiskLevel::High).unwrap();
        assert_eq!(
            hundredths(&curve),
            vec![3400, 1110, 260, 44, 20, 20, 44, 260, 1110, 3400]
        );
    }

    #[test]
    fn center_is_strictly_below_edges_on_eight_rows() {
        for risk in RiskLevel::ALL {
            let curve = generate_curve(8, risk).unwrap();
            let center = curve.get(4).unwrap();
            assert!(center < curve.get(0).unwrap());
            assert!(center < curve.get(8).unwrap());
            for i in 0..=8 {
                assert_eq!(curve.get(i), curve.get(8 - i));
            }
        }
    }

    #[test]
    fn high_risk_center_punishes() {
        for rows in MIN_ROWS..=MAX_ROWS {
            let curve = generate_curve(rows, RiskLevel::High).unwrap();
            assert!(curve.get(curve.center_index()).unwrap() < Multiplier::ONE);
        }
    }

    #[test]
    fn edges_are_exact_table_values() {
        let curve = generate_curve(15, RiskLevel::Medium).unwrap();
        assert_eq!(curve.get(0), Some(Multiplier::from_hundredths(3_100)));
        assert_eq!(curve.get(15), Some(Multiplier::from_hundredths(3_100)));
    }

    #[test]
    fn exponent_grows_with_risk() {
        let config = |risk| BoardConfig::new(12, risk).unwrap();
        let low = CurveParams::lookup(config(RiskLevel::Low));
        let medium = CurveParams::lookup(config(RiskLevel::Medium));
        let high = CurveParams::lookup(config(RiskLevel::High));
        assert!(low.exponent < medium.exponent && medium.exponent < high.exponent);
    }

    #[test]
    fn display_rounding_bands() {
        assert_eq!(round_for_display(128.4), Multiplier::from_hundredths(12_800));
        assert_eq!(round_for_display(15.94), Multiplier::from_hundredths(1_590));
        assert_eq!(round_for_display(7.2695), Multiplier::from_hundredths(727));
        assert_eq!(round_for_display(0.2), Multiplier::from_hundredths(20));
    }

    #[test]
    fn rejects_unsupported_rows() {
        assert_eq!(
            generate_curve(20, RiskLevel::Low),
            Err(ValidationError::RowsOutOfRange(20))
        );
    }

    fn risk_strategy() -> impl Strategy<Value = RiskLevel> {
        prop_oneof![
            Just(RiskLevel::Low),
            Just(RiskLevel::Medium),
            Just(RiskLevel::High)
        ]
    }

    proptest! {
        #[test]
        fn curves_are_symmetric(rows in MIN_ROWS..=MAX_ROWS, risk in risk_strategy()) {
            let curve = generate_curve(rows, risk).unwrap();
            prop_assert_eq!(curve.buckets(), usize::from(rows) + 1);
            let last = usize::from(rows);
            for i in 0..=last {
                prop_assert_eq!(curve.get(i), curve.get(last - i));
            }
        }

        #[test]
        fn curves_fall_towards_the_center(rows in MIN_ROWS..=MAX_ROWS, risk in risk_strategy()) {
            let curve = generate_curve(rows, risk).unwrap();
            for i in 1..=curve.center_index() {
                prop_assert!(curve.get(i) <= curve.get(i - 1));
            }
        }
    }
}
