//! The transition-prior table and its ordered-fallback lookup.

use crate::key::{GapBucket, PriorTriple};
use cache_store::atomic_write_csv;
use scan_core::ScanError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const PRIOR_HEADERS: &[&str] = &[
    "sector",
    "liquidity_bucket",
    "volatility_bucket",
    "gap_bucket",
    "pi_S0_S1",
    "pi_S1_S2",
    "pi_S2_S3",
    "support",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRow {
    pub sector: String,
    pub liquidity_bucket: u8,
    pub volatility_bucket: u8,
    pub gap_bucket: GapBucket,
    #[serde(rename = "pi_S0_S1")]
    pub pi_s0_s1: f64,
    #[serde(rename = "pi_S1_S2")]
    pub pi_s1_s2: f64,
    #[serde(rename = "pi_S2_S3")]
    pub pi_s2_s3: f64,
    pub support: u64,
}

impl PriorRow {
    fn triple(&self) -> PriorTriple {
        PriorTriple {
            pi_s0_s1: self.pi_s0_s1,
            pi_s1_s2: self.pi_s1_s2,
            pi_s2_s3: self.pi_s2_s3,
            support: self.support,
        }
    }
}

/// Read-only prior table. Lookup order: exact regime key → same buckets with
/// the sector dropped → corpus-wide mean (support 0). Always returns a triple
/// in [0,1]³.
#[derive(Debug, Clone)]
pub struct PriorTable {
    rows: Vec<PriorRow>,
    global: PriorTriple,
}

impl PriorTable {
    pub fn from_rows(mut rows: Vec<PriorRow>) -> Self {
        for row in &mut rows {
            row.pi_s0_s1 = row.pi_s0_s1.clamp(0.0, 1.0);
            row.pi_s1_s2 = row.pi_s1_s2.clamp(0.0, 1.0);
            row.pi_s2_s3 = row.pi_s2_s3.clamp(0.0, 1.0);
        }
        let global = if rows.is_empty() {
            PriorTriple {
                pi_s0_s1: 0.0,
                pi_s1_s2: 0.0,
                pi_s2_s3: 0.0,
                support: 0,
            }
        } else {
            let n = rows.len() as f64;
            PriorTriple {
                pi_s0_s1: rows.iter().map(|r| r.pi_s0_s1).sum::<f64>() / n,
                pi_s1_s2: rows.iter().map(|r| r.pi_s1_s2).sum::<f64>() / n,
                pi_s2_s3: rows.iter().map(|r| r.pi_s2_s3).sum::<f64>() / n,
                support: 0,
            }
        };
        Self { rows, global }
    }

    pub fn load_csv(path: &Path) -> Result<Self, ScanError> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| ScanError::InvalidData(format!("{}: {e}", path.display())))?;
        let mut rows = Vec::new();
        for row in reader.deserialize::<PriorRow>() {
            let row = row
                .map_err(|e| ScanError::SchemaViolation(format!("{}: {e}", path.display())))?;
            rows.push(row);
        }
        Ok(Self::from_rows(rows))
    }

    pub fn save_csv(&self, path: &Path) -> Result<(), ScanError> {
        atomic_write_csv(path, PRIOR_HEADERS, &self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PriorRow] {
        &self.rows
    }

    /// Total lookup. Specificity degrades before availability does: an
    /// unseen sector reuses the bucket-level rates, an unseen bucket
    /// combination the corpus mean.
    pub fn get_prior(
        &self,
        sector: &str,
        liq_bucket: u8,
        vol_bucket: u8,
        gap_bucket: GapBucket,
    ) -> PriorTriple {
        if let Some(row) = self.rows.iter().find(|r| {
            r.sector == sector
                && r.liquidity_bucket == liq_bucket
                && r.volatility_bucket == vol_bucket
                && r.gap_bucket == gap_bucket
        }) {
            return row.triple();
        }
        if let Some(row) = self.rows.iter().find(|r| {
            r.liquidity_bucket == liq_bucket
                && r.volatility_bucket == vol_bucket
                && r.gap_bucket == gap_bucket
        }) {
            return row.triple();
        }
        self.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(sector: &str, liq: u8, vol: u8, gap: GapBucket, p1: f64) -> PriorRow {
        PriorRow {
            sector: sector.to_string(),
            liquidity_bucket: liq,
            volatility_bucket: vol,
            gap_bucket: gap,
            pi_s0_s1: p1,
            pi_s1_s2: 0.3,
            pi_s2_s3: 0.6,
            support: 42,
        }
    }

    #[test]
    fn test_exact_match_wins() {
        let table = PriorTable::from_rows(vec![
            row("FIN", 5, 5, GapBucket::Up, 0.9),
            row("TECH", 5, 5, GapBucket::Up, 0.7),
        ]);
        let p = table.get_prior("TECH", 5, 5, GapBucket::Up);
        assert_eq!(p.pi_s0_s1, 0.7);
        assert_eq!(p.support, 42);
    }

    #[test]
    fn test_sector_dropped_fallback() {
        let table = PriorTable::from_rows(vec![row("FIN", 5, 5, GapBucket::Up, 0.9)]);
        let p = table.get_prior("TECH", 5, 5, GapBucket::Up);
        assert_eq!(p.pi_s0_s1, 0.9);
    }

    #[test]
    fn test_global_mean_fallback_has_zero_support() {
        let table = PriorTable::from_rows(vec![
            row("FIN", 1, 1, GapBucket::Down, 0.2),
            row("FIN", 2, 2, GapBucket::Up, 0.8),
        ]);
        let p = table.get_prior("TECH", 9, 9, GapBucket::Flat);
        assert!((p.pi_s0_s1 - 0.5).abs() < 1e-12);
        assert_eq!(p.support, 0);
    }

    #[test]
    fn test_lookup_is_total_and_in_unit_cube() {
        let table = PriorTable::from_rows(vec![]);
        for liq in [0u8, 4, 9] {
            for vol in [0u8, 4, 9] {
                for gap in [GapBucket::Down, GapBucket::Flat, GapBucket::Up] {
                    let p = table.get_prior("anything", liq, vol, gap);
                    for v in [p.pi_s0_s1, p.pi_s1_s2, p.pi_s2_s3] {
                        assert!((0.0..=1.0).contains(&v));
                    }
                }
            }
        }
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prior_transition.csv");
        let table = PriorTable::from_rows(vec![row("UNK", 3, 7, GapBucket::Flat, 0.55)]);
        table.save_csv(&path).unwrap();
        let loaded = PriorTable::load_csv(&path).unwrap();
        assert_eq!(loaded.rows(), table.rows());
    }

    #[test]
    fn test_load_rejects_wrong_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "sector,foo\nUNK,1\n").unwrap();
        assert!(matches!(
            PriorTable::load_csv(&path),
            Err(ScanError::SchemaViolation(_))
        ));
    }
}
