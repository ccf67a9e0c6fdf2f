//! Probability-chain blending.
//!
//! A ticker's same-day heuristic likelihood is blended with its regime's
//! historical transition rates, stage by stage. Thin names get noisier
//! same-day signals, so the blend weight leans toward the historical prior
//! as illiquidity rises, and the final chain probability carries a separate
//! liquidity penalty for execution risk the stages don't see.

use chrono::NaiveDate;
use feature_engine::CandidateRow;
use regime_prior::{GapBucket, PriorTriple};
use scan_core::BlendConfig;
use serde::{Deserialize, Serialize};

pub const SCORED_HEADERS: &[&str] = &[
    "ticker",
    "price_at_cutoff",
    "daily_return",
    "vol_pace",
    "score",
    "last",
    "closing_strength",
    "afternoon_power",
    "zvol",
    "vwap_dev",
    "persistence",
    "spread",
    "buy_pressure",
    "persist_count",
    "liq_bucket",
    "vol_bucket",
    "gap_bucket",
    "pi_S0_S1",
    "pi_S1_S2",
    "pi_S2_S3",
    "p_eod",
    "p_am3",
    "p_d2",
    "p_chain",
    "recommendation",
];

/// Candidate extended with regime context, stage probabilities, and the
/// recommendation label. One row per (date, ticker, cutoff); terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRow {
    pub ticker: String,
    pub price_at_cutoff: f64,
    pub daily_return: f64,
    pub vol_pace: f64,
    pub score: f64,
    pub last: f64,
    pub closing_strength: f64,
    pub afternoon_power: f64,
    pub zvol: Option<f64>,
    pub vwap_dev: f64,
    pub persistence: u32,
    pub spread: f64,
    pub buy_pressure: f64,
    pub persist_count: u32,
    pub liq_bucket: u8,
    pub vol_bucket: u8,
    pub gap_bucket: GapBucket,
    #[serde(rename = "pi_S0_S1")]
    pub pi_s0_s1: f64,
    #[serde(rename = "pi_S1_S2")]
    pub pi_s1_s2: f64,
    #[serde(rename = "pi_S2_S3")]
    pub pi_s2_s3: f64,
    pub p_eod: f64,
    pub p_am3: f64,
    pub p_d2: f64,
    pub p_chain: f64,
    pub recommendation: String,
    #[serde(skip)]
    pub date: Option<NaiveDate>,
}

/// Heuristic likelihood of continuation from same-day features, a fixed-form
/// logistic mapped into (0, 1).
pub fn heuristic_likelihood(
    closing_strength: f64,
    afternoon_power: f64,
    persist_norm: f64,
) -> f64 {
    let z = 2.2 * closing_strength + 1.4 * afternoon_power + 0.6 * persist_norm - 2.0;
    1.0 / (1.0 + (-z).exp())
}

/// Illiquidity proxy: inverse of volume pace, saturating at pace 1.
pub fn illiquidity(vol_pace: f64) -> f64 {
    1.0 / (1.0 + vol_pace.max(1.0))
}

/// Convex blend of prior and likelihood, clamped to [0, 1].
pub fn blend(prior: f64, likelihood: f64, alpha: f64) -> f64 {
    (alpha * prior + (1.0 - alpha) * likelihood).clamp(0.0, 1.0)
}

/// Chain discount for execution risk in thin names.
pub fn liquidity_penalty(illiq: f64, lambda: f64) -> f64 {
    (1.0 - lambda * illiq).max(0.0)
}

pub struct ChainBlender {
    cfg: BlendConfig,
}

impl ChainBlender {
    pub fn new(cfg: BlendConfig) -> Self {
        Self { cfg }
    }

    /// Blend one candidate with its regime prior into a scored row. The
    /// recommendation label is left empty for the classifier.
    pub fn score(
        &self,
        row: &CandidateRow,
        prior: &PriorTriple,
        liq_bucket: u8,
        vol_bucket: u8,
        gap_bucket: GapBucket,
    ) -> ScoredRow {
        let persist_norm = (row.persist_count as f64 / self.cfg.persist_norm_cap).min(1.0);
        let likelihood =
            heuristic_likelihood(row.closing_strength, row.afternoon_power, persist_norm);
        let illiq = illiquidity(row.vol_pace);
        let alpha = self.cfg.alpha_base + self.cfg.alpha_span * illiq.min(1.0);

        let p_eod = blend(prior.pi_s0_s1, likelihood, alpha);
        let p_am3 = blend(prior.pi_s1_s2, likelihood, alpha);
        let p_d2 = blend(prior.pi_s2_s3, likelihood, alpha);
        let p_chain = p_eod * p_am3 * p_d2 * liquidity_penalty(illiq, self.cfg.lambda);

        ScoredRow {
            ticker: row.ticker.clone(),
            price_at_cutoff: row.price_at_cutoff,
            daily_return: row.daily_return,
            vol_pace: row.vol_pace,
            score: row.score,
            last: row.last,
            closing_strength: row.closing_strength,
            afternoon_power: row.afternoon_power,
            zvol: row.zvol,
            vwap_dev: row.vwap_dev,
            persistence: row.persistence,
            spread: row.spread,
            buy_pressure: row.buy_pressure,
            persist_count: row.persist_count,
            liq_bucket,
            vol_bucket,
            gap_bucket,
            pi_s0_s1: prior.pi_s0_s1,
            pi_s1_s2: prior.pi_s1_s2,
            pi_s2_s3: prior.pi_s2_s3,
            p_eod,
            p_am3,
            p_d2,
            p_chain,
            recommendation: String::new(),
            date: Some(row.date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candidate(vol_pace: f64, persist_count: u32) -> CandidateRow {
        CandidateRow {
            ticker: "AAA".into(),
            date: NaiveDate::from_ymd_opt(2025, 8, 27).unwrap(),
            price_at_cutoff: 100.0,
            last: 100.0,
            daily_return: 0.05,
            closing_strength: 0.9,
            afternoon_power: 0.2,
            vol_pace,
            zvol: None,
            vwap_dev: 0.01,
            persistence: 2,
            spread: 0.01,
            buy_pressure: 0.7,
            score: 2.0,
            persist_count,
        }
    }

    fn prior() -> PriorTriple {
        PriorTriple {
            pi_s0_s1: 0.7,
            pi_s1_s2: 0.3,
            pi_s2_s3: 0.6,
            support: 100,
        }
    }

    #[test]
    fn test_likelihood_in_unit_interval() {
        for cs in [0.0, 0.5, 1.0] {
            for ap in [-0.5, 0.0, 0.8] {
                for pn in [0.0, 1.0] {
                    let l = heuristic_likelihood(cs, ap, pn);
                    assert!(l > 0.0 && l < 1.0);
                }
            }
        }
    }

    #[test]
    fn test_blend_clamps() {
        assert_eq!(blend(2.0, 2.0, 0.5), 1.0);
        assert_eq!(blend(-1.0, -1.0, 0.5), 0.0);
        assert!((blend(0.6, 0.2, 0.5) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_chain_probability_in_unit_interval() {
        let blender = ChainBlender::new(Default::default());
        for pace in [1.0, 3.0, 10.0, 100.0] {
            for pc in [0, 1, 3] {
                let scored = blender.score(
                    &candidate(pace, pc),
                    &prior(),
                    5,
                    5,
                    GapBucket::Up,
                );
                assert!((0.0..=1.0).contains(&scored.p_chain));
                for p in [scored.p_eod, scored.p_am3, scored.p_d2] {
                    assert!((0.0..=1.0).contains(&p));
                }
            }
        }
    }

    #[test]
    fn test_chain_non_increasing_in_lambda() {
        let stage = 0.8 * 0.4 * 0.6;
        let illiq = illiquidity(2.0);
        let mut prev = f64::MAX;
        for lambda in [0.0, 0.2, 0.35, 0.6, 1.0] {
            let chain = stage * liquidity_penalty(illiq, lambda);
            assert!(chain <= prev);
            prev = chain;
        }
    }

    #[test]
    fn test_thin_names_lean_on_prior() {
        let blender = ChainBlender::new(Default::default());
        // illiquid: pace 1 → illiq = 0.5 → alpha = 0.75
        let thin = blender.score(&candidate(1.0, 1), &prior(), 5, 5, GapBucket::Flat);
        // deep: pace 50 → illiq ≈ 0.02 → alpha ≈ 0.606
        let deep = blender.score(&candidate(50.0, 1), &prior(), 5, 5, GapBucket::Flat);
        // prior for stage 1 is 0.7; the thin name's blend sits closer to it
        let d_thin = (thin.p_eod - 0.7).abs();
        let d_deep = (deep.p_eod - 0.7).abs();
        assert!(d_thin < d_deep);
    }

    #[test]
    fn test_known_value_blend() {
        let blender = ChainBlender::new(Default::default());
        let row = candidate(4.0, 3);
        let scored = blender.score(&row, &prior(), 2, 7, GapBucket::Up);

        let like = heuristic_likelihood(0.9, 0.2, 1.0);
        let illiq = 1.0 / 5.0;
        let alpha = 0.6 + 0.3 * illiq;
        let p1 = alpha * 0.7 + (1.0 - alpha) * like;
        assert!((scored.p_eod - p1).abs() < 1e-12);
        let penalty = 1.0 - 0.35 * illiq;
        assert!(
            (scored.p_chain - scored.p_eod * scored.p_am3 * scored.p_d2 * penalty).abs()
                < 1e-12
        );
    }
}
