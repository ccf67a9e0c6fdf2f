//! Per-cutoff candidate snapshot artifacts.
//!
//! One CSV per (date, cutoff), named so same-day files can be discovered by
//! pattern. The reader enforces the required column contract; a snapshot
//! missing a required column is unusable and fails loudly rather than being
//! partially processed.

use chrono::NaiveDate;
use scan_core::{ScanError, Slot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const REQUIRED_COLS: &[&str] = &[
    "ticker",
    "price_at_cutoff",
    "daily_return",
    "vol_pace",
    "score",
    "last",
];

pub const OPTIONAL_ZERO_COLS: &[&str] = &["closing_strength", "afternoon_power"];

/// The column subset every snapshot carries, whatever else the producer adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub ticker: String,
    pub price_at_cutoff: f64,
    pub daily_return: f64,
    pub vol_pace: f64,
    pub score: f64,
    pub last: f64,
    pub closing_strength: f64,
    pub afternoon_power: f64,
}

/// Canonical snapshot filename: `snapshot_<date>_<HHMM>.csv`.
pub fn snapshot_filename(date: NaiveDate, slot: Slot) -> String {
    format!("snapshot_{}_{}.csv", date, slot.hhmm())
}

/// Inverse of [`snapshot_filename`]; None for files that are not snapshots.
pub fn parse_snapshot_filename(name: &str) -> Option<(NaiveDate, String)> {
    let rest = name.strip_prefix("snapshot_")?.strip_suffix(".csv")?;
    let (date_part, hhmm) = rest.rsplit_once('_')?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    if hhmm.len() == 4 && hhmm.bytes().all(|b| b.is_ascii_digit()) {
        Some((date, hhmm.to_string()))
    } else {
        None
    }
}

/// Read a snapshot, enforcing required columns and imputing optional ones
/// to 0.0. Rows with an empty ticker are skipped.
pub fn read_snapshot(path: &Path) -> Result<Vec<SnapshotRow>, ScanError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ScanError::InvalidData(format!("{}: {e}", path.display())))?;

    let headers: HashMap<String, usize> = reader
        .headers()
        .map_err(|e| ScanError::InvalidData(format!("{}: {e}", path.display())))?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase().replace(' ', "_"), i))
        .collect();

    let missing: Vec<&str> = REQUIRED_COLS
        .iter()
        .filter(|c| !headers.contains_key(**c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ScanError::SchemaViolation(format!(
            "{} missing required columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let idx = |name: &str| headers.get(name).copied();
    let number = |record: &csv::StringRecord, name: &str| -> f64 {
        idx(name)
            .and_then(|i| record.get(i))
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| ScanError::InvalidData(format!("{}: {e}", path.display())))?;
        let ticker = idx("ticker")
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .trim()
            .to_string();
        if ticker.is_empty() {
            continue;
        }
        rows.push(SnapshotRow {
            ticker,
            price_at_cutoff: number(&record, "price_at_cutoff"),
            daily_return: number(&record, "daily_return"),
            vol_pace: number(&record, "vol_pace"),
            score: number(&record, "score"),
            last: number(&record, "last"),
            closing_strength: number(&record, "closing_strength"),
            afternoon_power: number(&record, "afternoon_power"),
        });
    }
    Ok(rows)
}
