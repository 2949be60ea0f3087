use plinko_types::{validation::validate_rows, ValidationError};

/// Peg layout derived from a row count.
///
/// Row `r` (0-indexed) holds `r + 3` pegs; a token leaving the last row lands in one of
/// `rows + 1` buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardGeometry {
    rows: u8,
}

impl BoardGeometry {
    pub fn new(rows: u8) -> Result<Self, ValidationError> {
        validate_rows(rows)?;
        Ok(Self { rows })
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn buckets(&self) -> usize {
        usize::from(self.rows) + 1
    }

    /// Left-central bucket (the only central bucket on even boards).
    pub fn center_index(&self) -> usize {
        usize::from(self.rows) / 2
    }

    pub fn pegs_in_row(&self, row: u8) -> Option<usize> {
        (row < self.rows).then(|| usize::from(row) + 3)
    }

    pub fn total_pegs(&self) -> usize {
        (0..self.rows).filter_map(|row| self.pegs_in_row(row)).sum()
    }

    /// Horizontal peg positions of `row`, centred on zero and one unit apart.
    pub fn peg_offsets(&self, row: u8) -> Option<Vec<f64>> {
        let pegs = self.pegs_in_row(row)?;
        let half = (pegs - 1) as f64 / 2.0;
        Some((0..pegs).map(|peg| peg as f64 - half).collect())
    }

    /// Horizontal bucket centres on the same axis as [`Self::peg_offsets`].
    pub fn bucket_offsets(&self) -> Vec<f64> {
        let half = self.rows as f64 / 2.0;
        (0..self.buckets()).map(|bucket| bucket as f64 - half).collect()
    }
}
