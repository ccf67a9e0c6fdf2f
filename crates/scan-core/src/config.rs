use crate::types::Slot;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Volume-pace baseline settings for the resolution fallback cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaceConfig {
    /// Minimum positive same-cutoff observations for an intraday baseline
    pub min_intraday_obs: usize,
    /// Minimum daily rows for the daily-approximation baseline
    pub min_daily_obs: usize,
    /// Scale applied to the daily median to approximate a partial-day volume
    pub daily_cut_factor: f64,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            min_intraday_obs: 10,
            min_daily_obs: 20,
            daily_cut_factor: 0.75,
        }
    }
}

/// Minute-of-day volume anomaly settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZVolConfig {
    /// Trailing sessions used to build the per-minute volume profile
    pub window_days: usize,
    /// Gate: drop when the z-score is defined and below this. None disables
    /// the gate; an undefined z-score never gates.
    pub gate_min: Option<f64>,
}

impl Default for ZVolConfig {
    fn default() -> Self {
        Self {
            window_days: 20,
            gate_min: None,
        }
    }
}

/// Bar-level persistence filter over the trailing 1-minute window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub window_bars: usize,
    /// ZVol threshold paired with a positive 1-minute return
    pub zvol_up: f64,
    /// ZVol threshold paired with price above running VWAP
    pub zvol_vwap: f64,
    /// Minimum qualifying bars; 0 disables the gate
    pub min_count: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            window_bars: 30,
            zvol_up: 2.0,
            zvol_vwap: 1.5,
            min_count: 0,
        }
    }
}

/// Execution-cost proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadConfig {
    pub window_bars: usize,
    /// Maximum admissible mean relative range. None disables the gate.
    pub max: Option<f64>,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            window_bars: 20,
            max: None,
        }
    }
}

/// Prior/likelihood blending parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendConfig {
    /// Base weight on the historical prior
    pub alpha_base: f64,
    /// Extra prior weight scaled by the illiquidity proxy
    pub alpha_span: f64,
    /// Liquidity-penalty slope on the chain probability
    pub lambda: f64,
    /// persist_count divisor when normalizing into [0, 1]
    pub persist_norm_cap: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            alpha_base: 0.6,
            alpha_span: 0.3,
            lambda: 0.35,
            persist_norm_cap: 3.0,
        }
    }
}

/// Absolute floors for the recommendation gate. Quantile counterparts are
/// computed per batch; the effective threshold is the max of the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub min_persist: u32,
    pub min_vol_pace: f64,
    pub p1_abs: f64,
    pub p1_strong_abs: f64,
    pub p2_abs: f64,
    pub p3_abs: f64,
    /// Pace floor the fast lane still requires
    pub fast_lane_pace: f64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_persist: 1,
            min_vol_pace: 5.0,
            p1_abs: 0.65,
            p1_strong_abs: 0.80,
            p2_abs: 0.20,
            p3_abs: 0.50,
            fast_lane_pace: 5.0,
        }
    }
}

/// Forward-labeling windows for the offline prior build. The lookahead
/// offsets are session counts, not calendar days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub next_session: usize,
    pub continuation_session: usize,
    /// Tolerance below the reference price that still counts as holding
    pub eod_epsilon: f64,
    /// Next-morning gain threshold
    pub morning_threshold: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            next_session: 1,
            continuation_session: 2,
            eod_epsilon: 0.0075,
            morning_threshold: 0.03,
        }
    }
}

/// Scanner configuration, passed explicitly to every component constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub baseline_days: usize,
    pub pace_min: f64,
    pub ret_min: f64,
    pub ret_max: f64,
    pub top_n: usize,
    pub min_price: Option<f64>,
    /// Post-lunch session boundary for afternoon power
    pub afternoon_boundary: NaiveTime,
    /// Flat band for the opening-gap bucket (±)
    pub gap_flat_band: f64,
    pub sector_default: String,
    /// Configured day checkpoints, ascending
    pub slots: Vec<Slot>,
    pub pace: PaceConfig,
    pub zvol: ZVolConfig,
    pub persistence: PersistenceConfig,
    pub spread: SpreadConfig,
    pub blend: BlendConfig,
    pub guards: GuardConfig,
    pub labels: LabelConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            baseline_days: 60,
            pace_min: 1.2,
            ret_min: 0.01,
            ret_max: 0.40,
            top_n: 10,
            min_price: None,
            afternoon_boundary: NaiveTime::from_hms_opt(13, 30, 0).unwrap(),
            gap_flat_band: 0.01,
            sector_default: "UNK".to_string(),
            slots: ["09:30", "11:30", "14:15"]
                .iter()
                .map(|s| Slot::parse(s).unwrap())
                .collect(),
            pace: PaceConfig::default(),
            zvol: ZVolConfig::default(),
            persistence: PersistenceConfig::default(),
            spread: SpreadConfig::default(),
            blend: BlendConfig::default(),
            guards: GuardConfig::default(),
            labels: LabelConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slots_ascending() {
        let cfg = ScanConfig::default();
        assert_eq!(cfg.slots.len(), 3);
        assert!(cfg.slots.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_default_guards_match_floors() {
        let g = GuardConfig::default();
        assert_eq!(g.min_persist, 1);
        assert_eq!(g.min_vol_pace, 5.0);
        assert!(g.p1_strong_abs > g.p1_abs);
    }
}
