//! Decile-edge reference used to bucket continuous regime features.
//!
//! Edges are the 10th..90th percentiles of the training distribution.
//! Bucketing is "≤ edge": a value exactly equal to edge i lands in bucket
//! i−1, values above the 9th edge in bucket 9. Edges are non-decreasing by
//! construction; a small or constant corpus may repeat values, which is fine.

use cache_store::atomic_write_text;
use scan_core::{adaptive, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const EDGE_COUNT: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct DecileEdges {
    pub turnover: [f64; EDGE_COUNT],
    pub atr14: [f64; EDGE_COUNT],
}

/// On-disk JSON shape: feature name → {"1"…"9" → threshold}.
#[derive(Serialize, Deserialize)]
struct EdgesFile {
    turnover_deciles: BTreeMap<String, f64>,
    atr14_deciles: BTreeMap<String, f64>,
}

fn to_map(edges: &[f64; EDGE_COUNT]) -> BTreeMap<String, f64> {
    edges
        .iter()
        .enumerate()
        .map(|(i, &v)| ((i + 1).to_string(), v))
        .collect()
}

fn from_map(map: &BTreeMap<String, f64>) -> Result<[f64; EDGE_COUNT], ScanError> {
    let mut edges = [0.0; EDGE_COUNT];
    for (i, edge) in edges.iter_mut().enumerate() {
        *edge = *map.get(&(i + 1).to_string()).ok_or_else(|| {
            ScanError::SchemaViolation(format!("decile edges missing index {}", i + 1))
        })?;
    }
    Ok(edges)
}

impl DecileEdges {
    /// Learn edges from raw feature samples. Non-finite samples are ignored.
    pub fn learn(turnover: &[f64], atr14: &[f64]) -> Result<Self, ScanError> {
        let clean = |vals: &[f64]| -> Vec<f64> {
            vals.iter().copied().filter(|v| v.is_finite()).collect()
        };
        let turnover = clean(turnover);
        let atr14 = clean(atr14);
        if turnover.is_empty() || atr14.is_empty() {
            return Err(ScanError::InsufficientData(
                "no finite samples to learn decile edges from".into(),
            ));
        }
        let deciles = |vals: &[f64]| {
            let mut edges = [0.0; EDGE_COUNT];
            for (i, edge) in edges.iter_mut().enumerate() {
                *edge = adaptive::quantile(vals, (i + 1) as f64 / 10.0);
            }
            edges
        };
        Ok(Self {
            turnover: deciles(&turnover),
            atr14: deciles(&atr14),
        })
    }

    pub fn bucket_turnover(&self, value: f64) -> u8 {
        bucket_for(value, &self.turnover)
    }

    pub fn bucket_atr14(&self, value: f64) -> u8 {
        bucket_for(value, &self.atr14)
    }

    pub fn save(&self, path: &Path) -> Result<(), ScanError> {
        let file = EdgesFile {
            turnover_deciles: to_map(&self.turnover),
            atr14_deciles: to_map(&self.atr14),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ScanError::InvalidData(e.to_string()))?;
        atomic_write_text(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let text = std::fs::read_to_string(path)?;
        let file: EdgesFile = serde_json::from_str(&text)
            .map_err(|e| ScanError::SchemaViolation(format!("{}: {e}", path.display())))?;
        Ok(Self {
            turnover: from_map(&file.turnover_deciles)?,
            atr14: from_map(&file.atr14_deciles)?,
        })
    }
}

/// First edge with value ≤ edge wins; above all edges is the top bucket.
pub fn bucket_for(value: f64, edges: &[f64; EDGE_COUNT]) -> u8 {
    for (i, &edge) in edges.iter().enumerate() {
        if value <= edge {
            return i as u8;
        }
    }
    EDGE_COUNT as u8
}
