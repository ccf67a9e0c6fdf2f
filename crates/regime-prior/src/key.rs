use serde::{Deserialize, Serialize};
use std::fmt;

/// Opening gap direction relative to the previous session's close.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GapBucket {
    Down,
    Flat,
    Up,
}

impl GapBucket {
    /// Bucket an opening gap with a symmetric flat band.
    pub fn from_gap(gap: f64, flat_band: f64) -> Self {
        if gap < -flat_band {
            GapBucket::Down
        } else if gap > flat_band {
            GapBucket::Up
        } else {
            GapBucket::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GapBucket::Down => "down",
            GapBucket::Flat => "flat",
            GapBucket::Up => "up",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "down" => Some(GapBucket::Down),
            "flat" => Some(GapBucket::Flat),
            "up" => Some(GapBucket::Up),
            _ => None,
        }
    }
}

impl fmt::Display for GapBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical regime: sector plus liquidity decile, volatility decile, and
/// gap direction.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RegimeKey {
    pub sector: String,
    pub liq_bucket: u8,
    pub vol_bucket: u8,
    pub gap_bucket: GapBucket,
}

/// Empirical rates of the three sequential continuation events, with the
/// number of corpus rows behind them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorTriple {
    pub pi_s0_s1: f64,
    pub pi_s1_s2: f64,
    pub pi_s2_s3: f64,
    pub support: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_bucket_flat_band() {
        assert_eq!(GapBucket::from_gap(-0.02, 0.01), GapBucket::Down);
        assert_eq!(GapBucket::from_gap(-0.01, 0.01), GapBucket::Flat);
        assert_eq!(GapBucket::from_gap(0.0, 0.01), GapBucket::Flat);
        assert_eq!(GapBucket::from_gap(0.01, 0.01), GapBucket::Flat);
        assert_eq!(GapBucket::from_gap(0.011, 0.01), GapBucket::Up);
    }

    #[test]
    fn test_gap_bucket_string_round_trip() {
        for b in [GapBucket::Down, GapBucket::Flat, GapBucket::Up] {
            assert_eq!(GapBucket::from_str(b.as_str()), Some(b));
        }
        assert_eq!(GapBucket::from_str("sideways"), None);
    }
}
