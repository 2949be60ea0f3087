use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{
    money::Multiplier,
    validation::{validate_rows, ValidationError},
    DEFAULT_ROWS,
};

/// Curve-shaping policy controlling variance and house edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(ValidationError::UnknownRiskLevel(s.to_string())),
        }
    }
}

/// Which balance a bet draws from.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Demo = 0,
    Real = 1,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Demo => "demo",
            GameMode::Real => "real",
        }
    }
}

impl TryFrom<u8> for GameMode {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameMode::Demo),
            1 => Ok(GameMode::Real),
            _ => Err(ValidationError::UnknownMode(value.to_string())),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(GameMode::Demo),
            "real" => Ok(GameMode::Real),
            _ => Err(ValidationError::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct RawBoardConfig {
    rows: u8,
    risk: RiskLevel,
}

/// Validated `(rows, risk)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawBoardConfig")]
pub struct BoardConfig {
    rows: u8,
    risk: RiskLevel,
}

impl BoardConfig {
    pub fn new(rows: u8, risk: RiskLevel) -> Result<Self, ValidationError> {
        validate_rows(rows)?;
        Ok(Self { rows, risk })
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn risk(&self) -> RiskLevel {
        self.risk
    }

    /// Number of terminal buckets (`rows + 1`).
    pub fn buckets(&self) -> usize {
        usize::from(self.rows) + 1
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            risk: RiskLevel::Medium,
        }
    }
}

impl TryFrom<RawBoardConfig> for BoardConfig {
    type Error = ValidationError;

    fn try_from(raw: RawBoardConfig) -> Result<Self, Self::Error> {
        BoardConfig::new(raw.rows, raw.risk)
    }
}

impl Write for RiskLevel {
    fn write(&self, writer: &mut impl BufMut) {
        let tag: u8 = match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        };
        tag.write(writer);
    }
}

impl Read for RiskLevel {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(RiskLevel::Low),
            1 => Ok(RiskLevel::Medium),
            2 => Ok(RiskLevel::High),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for RiskLevel {
    fn encode_size(&self) -> usize {
        1
    }
}

impl Write for GameMode {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for GameMode {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let tag = u8::read(reader)?;
        GameMode::try_from(tag).map_err(|_| Error::InvalidEnum(tag))
    }
}

impl EncodeSize for GameMode {
    fn encode_size(&self) -> usize {
        1
    }
}

impl Write for BoardConfig {
    fn write(&self, writer: &mut impl BufMut) {
        self.rows.write(writer);
        self.risk.write(writer);
    }
}

impl Read for BoardConfig {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let rows = u8::read(reader)?;
        let risk = RiskLevel::read(reader)?;
        BoardConfig::new(rows, risk).map_err(|_| Error::Invalid("BoardConfig", "rows out of range"))
    }
}

impl EncodeSize for BoardConfig {
    fn encode_size(&self) -> usize {
        self.rows.encode_size() + self.risk.encode_size()
    }
}

/// Ordered payout multipliers, one per bucket, symmetric around the center.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayoutCurve {
    #[serde(flatten)]
    config: BoardConfig,
    multipliers: Vec<Multiplier>,
}

impl PayoutCurve {
    pub fn new(config: BoardConfig, multipliers: Vec<Multiplier>) -> Result<Self, ValidationError> {
        if multipliers.len() != config.buckets() {
            return Err(ValidationError::CurveLength {
                expected: config.buckets(),
                got: multipliers.len(),
            });
        }
        let last = multipliers.len() - 1;
        if let Some(index) = (0..multipliers.len()).find(|&i| multipliers[i] != multipliers[last - i]) {
            return Err(ValidationError::AsymmetricCurve(index));
        }
        Ok(Self {
            config,
            multipliers,
        })
    }

    pub fn config(&self) -> BoardConfig {
        self.config
    }

    pub fn rows(&self) -> u8 {
        self.config.rows()
    }

    pub fn buckets(&self) -> usize {
        self.multipliers.len()
    }

    /// Index of the (left-)central bucket.
    pub fn center_index(&self) -> usize {
        usize::from(self.config.rows()) / 2
    }

    pub fn get(&self, bucket: usize) -> Option<Multiplier> {
        self.multipliers.get(bucket).copied()
    }

    pub fn multipliers(&self) -> &[Multiplier] {
        &self.multipliers
    }

    /// `(bucket_index, multiplier)` pairs in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Multiplier)> + '_ {
        self.multipliers.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_config_validates_rows() {
        assert!(BoardConfig::new(8, RiskLevel::Low).is_ok());
        assert_eq!(
            BoardConfig::new(17, RiskLevel::Low),
            Err(ValidationError::RowsOutOfRange(17))
        );
        let parsed: Result<BoardConfig, _> =
            serde_json::from_str(r#"{"rows":4,"risk":"high"}"#);
        assert!(parsed.is_err());
        let parsed: BoardConfig = serde_json::from_str(r#"{"rows":12,"risk":"high"}"#).unwrap();
        assert_eq!(parsed.buckets(), 13);
    }

    #[test]
    fn curve_rejects_wrong_length_and_asymmetry() {
        let config = BoardConfig::new(8, RiskLevel::Low).unwrap();
        let short = vec![Multiplier::ONE; 8];
        assert_eq!(
            PayoutCurve::new(config, short),
            Err(ValidationError::CurveLength { expected: 9, got: 8 })
        );

        let mut skewed = vec![Multiplier::ONE; 9];
        skewed[1] = Multiplier::from_hundredths(300);
        assert_eq!(
            PayoutCurve::new(config, skewed),
            Err(ValidationError::AsymmetricCurve(1))
        );
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!(" real ".parse::<GameMode>().unwrap(), GameMode::Real);
        assert!("extreme".parse::<RiskLevel>().is_err());
    }
}
