//! Adaptive gating and recommendation labels.
//!
//! Thresholds are recomputed from each cutoff batch's own distribution and
//! combined with absolute floors, so the gate tracks the day's overall
//! signal strength. A handful of very strong chain-probability names bypass
//! the ordinary guards through the fast lane; everything else has to pass
//! liquidity and persistence sanity checks before stage probabilities are
//! even compared.

use chain_blender::ScoredRow;
use scan_core::{adaptive, GuardConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recommendation tiers, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    /// Enter and hold across the full three-stage window
    HoldMultiDay,
    /// Enter, exit next session
    HoldOneDay,
    /// Flagged but not actionable
    Neutral,
    /// No recommendation
    Skip,
}

impl Recommendation {
    pub fn label(&self) -> &'static str {
        match self {
            Recommendation::HoldMultiDay => "hold multi-day",
            Recommendation::HoldOneDay => "hold one day",
            Recommendation::Neutral => "neutral",
            Recommendation::Skip => "skip",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Batch quantiles, computed once per cutoff and threaded into the
/// classifier rather than recomputed per row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub p1_q50: f64,
    pub p1_q60: f64,
    pub p2_q50: f64,
    pub p2_q60: f64,
    pub p3_q60: f64,
    pub chain_q80: f64,
}

impl BatchStats {
    pub fn compute(rows: &[ScoredRow]) -> Self {
        let p1: Vec<f64> = rows.iter().map(|r| r.p_eod).collect();
        let p2: Vec<f64> = rows.iter().map(|r| r.p_am3).collect();
        let p3: Vec<f64> = rows.iter().map(|r| r.p_d2).collect();
        let chain: Vec<f64> = rows.iter().map(|r| r.p_chain).collect();
        Self {
            p1_q50: adaptive::quantile(&p1, 0.50),
            p1_q60: adaptive::quantile(&p1, 0.60),
            p2_q50: adaptive::quantile(&p2, 0.50),
            p2_q60: adaptive::quantile(&p2, 0.60),
            p3_q60: adaptive::quantile(&p3, 0.60),
            chain_q80: adaptive::quantile(&chain, 0.80),
        }
    }
}

/// Effective thresholds for one batch: absolute floor or batch quantile,
/// whichever is tighter.
#[derive(Debug, Clone, Copy)]
pub struct Guards {
    pub min_persist: u32,
    pub min_vol_pace: f64,
    pub min_p_eod: f64,
    pub p1_strong: f64,
    pub p2_cut: f64,
    pub p3_cut: f64,
    pub fast_lane_pace: f64,
    pub chain_fast_lane: f64,
    /// Borderline tier compares against the batch medians directly
    pub p1_border: f64,
    pub p2_border: f64,
}

impl Guards {
    pub fn derive(cfg: &GuardConfig, stats: &BatchStats) -> Self {
        Self {
            min_persist: cfg.min_persist,
            min_vol_pace: cfg.min_vol_pace,
            min_p_eod: cfg.p1_abs.max(stats.p1_q50),
            p1_strong: cfg.p1_strong_abs.max(stats.p1_q60),
            p2_cut: cfg.p2_abs.max(stats.p2_q60),
            p3_cut: cfg.p3_abs.max(stats.p3_q60),
            fast_lane_pace: cfg.fast_lane_pace,
            chain_fast_lane: stats.chain_q80,
            p1_border: stats.p1_q50,
            p2_border: stats.p2_q50,
        }
    }
}

pub struct Recommender {
    cfg: GuardConfig,
}

impl Recommender {
    pub fn new(cfg: GuardConfig) -> Self {
        Self { cfg }
    }

    /// Label one row against the batch guards. First match wins.
    pub fn classify(&self, row: &ScoredRow, stats: &BatchStats) -> Recommendation {
        let guards = Guards::derive(&self.cfg, stats);
        self.classify_with(row, &guards)
    }

    fn classify_with(&self, row: &ScoredRow, guards: &Guards) -> Recommendation {
        // fast lane: top-decile chain probability skips the ordinary guards,
        // but still needs a minimally liquid, minimally persistent name
        if row.p_chain >= guards.chain_fast_lane
            && row.vol_pace >= guards.fast_lane_pace
            && row.persist_count >= 1
        {
            return Recommendation::HoldMultiDay;
        }

        if row.persist_count < guards.min_persist {
            return Recommendation::Skip;
        }
        if row.vol_pace < guards.min_vol_pace {
            return Recommendation::Skip;
        }
        if row.p_eod < guards.min_p_eod {
            return Recommendation::Skip;
        }

        if row.p_eod >= guards.p1_strong && row.p_am3 >= guards.p2_cut {
            if row.p_d2 >= guards.p3_cut {
                return Recommendation::HoldMultiDay;
            }
            return Recommendation::HoldOneDay;
        }

        if row.p_eod >= guards.p1_border && row.p_am3 >= guards.p2_border {
            return Recommendation::Neutral;
        }

        Recommendation::Skip
    }

    /// Sort a batch by chain probability (descending) and label every row.
    pub fn rank(&self, rows: &mut [ScoredRow]) -> BatchStats {
        rows.sort_by(|a, b| {
            b.p_chain
                .partial_cmp(&a.p_chain)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        let stats = BatchStats::compute(rows);
        let guards = Guards::derive(&self.cfg, &stats);
        for row in rows.iter_mut() {
            row.recommendation = self.classify_with(row, &guards).label().to_string();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_blender::ScoredRow;
    use regime_prior::GapBucket;
    use scan_core::GuardConfig;

    fn row(
        ticker: &str,
        pace: f64,
        persist: u32,
        p_eod: f64,
        p_am3: f64,
        p_d2: f64,
        p_chain: f64,
    ) -> ScoredRow {
        ScoredRow {
            ticker: ticker.into(),
            price_at_cutoff: 100.0,
            daily_return: 0.05,
            vol_pace: pace,
            score: 1.0,
            last: 100.0,
            closing_strength: 0.8,
            afternoon_power: 0.1,
            zvol: None,
            vwap_dev: 0.0,
            persistence: 1,
            spread: 0.01,
            buy_pressure: 0.5,
            persist_count: persist,
            liq_bucket: 5,
            vol_bucket: 5,
            gap_bucket: GapBucket::Flat,
            pi_s0_s1: 0.5,
            pi_s1_s2: 0.3,
            pi_s2_s3: 0.5,
            p_eod,
            p_am3,
            p_d2,
            p_chain,
            recommendation: String::new(),
            date: None,
        }
    }

    fn filler(i: usize, p_chain: f64) -> ScoredRow {
        row(&format!("F{i:02}"), 2.0, 0, 0.1, 0.1, 0.1, p_chain)
    }

    #[test]
    fn test_fast_lane_ignores_stage_probabilities() {
        // nine fillers with chain 0.01..0.09; AAA sits at the 85th percentile
        let mut rows: Vec<ScoredRow> =
            (1..=9).map(|i| filler(i, 0.01 * i as f64)).collect();
        rows.push(row("AAA", 6.0, 2, 0.1, 0.1, 0.1, 0.085));

        let rec = Recommender::new(GuardConfig::default());
        let stats = BatchStats::compute(&rows);
        assert!(stats.chain_q80 < 0.085);
        let aaa = rows.last().unwrap();
        assert_eq!(rec.classify(aaa, &stats), Recommendation::HoldMultiDay);
    }

    #[test]
    fn test_zero_persistence_is_skipped_despite_high_probabilities() {
        let mut rows: Vec<ScoredRow> =
            (1..=9).map(|i| filler(i, 0.5 + 0.05 * i as f64)).collect();
        rows.push(row("BBB", 10.0, 0, 0.95, 0.9, 0.9, 0.6));

        let rec = Recommender::new(GuardConfig::default());
        let stats = BatchStats::compute(&rows);
        let bbb = rows.last().unwrap();
        // chain below fast-lane threshold; persistence guard fires first
        assert!(bbb.p_chain < stats.chain_q80);
        assert_eq!(rec.classify(bbb, &stats), Recommendation::Skip);
    }

    #[test]
    fn test_strong_path_splits_on_third_stage() {
        let mut rows: Vec<ScoredRow> = (1..=8).map(|i| filler(i, 0.9)).collect();
        rows.push(row("TWO", 6.0, 1, 0.9, 0.5, 0.7, 0.1));
        rows.push(row("ONE", 6.0, 1, 0.9, 0.5, 0.3, 0.1));

        let rec = Recommender::new(GuardConfig::default());
        let stats = BatchStats::compute(&rows);
        assert_eq!(
            rec.classify(&rows[8], &stats),
            Recommendation::HoldMultiDay
        );
        assert_eq!(rec.classify(&rows[9], &stats), Recommendation::HoldOneDay);
    }

    #[test]
    fn test_borderline_is_neutral() {
        let mut rows: Vec<ScoredRow> = (1..=8).map(|i| filler(i, 0.9)).collect();
        rows.push(row("MID", 6.0, 1, 0.70, 0.15, 0.1, 0.1));

        let rec = Recommender::new(GuardConfig::default());
        let stats = BatchStats::compute(&rows);
        // passes the p_eod floor but not the strong tier; both medians clear
        assert_eq!(rec.classify(&rows[8], &stats), Recommendation::Neutral);
    }

    #[test]
    fn test_weak_rows_skip() {
        let mut rows: Vec<ScoredRow> = (1..=8).map(|i| filler(i, 0.9)).collect();
        rows.push(row("LOW", 6.0, 1, 0.3, 0.1, 0.1, 0.1));

        let rec = Recommender::new(GuardConfig::default());
        let stats = BatchStats::compute(&rows);
        assert_eq!(rec.classify(&rows[8], &stats), Recommendation::Skip);
    }

    #[test]
    fn test_rank_sorts_and_labels() {
        let mut rows = vec![
            row("AAA", 6.0, 2, 0.1, 0.1, 0.1, 0.2),
            row("BBB", 6.0, 2, 0.1, 0.1, 0.1, 0.8),
            row("CCC", 6.0, 2, 0.1, 0.1, 0.1, 0.5),
        ];
        let rec = Recommender::new(GuardConfig::default());
        rec.rank(&mut rows);
        let tickers: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB", "CCC", "AAA"]);
        assert!(rows.iter().all(|r| !r.recommendation.is_empty()));
    }
}
