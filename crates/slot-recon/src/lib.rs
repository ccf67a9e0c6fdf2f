//! Cross-slot reconciliation.
//!
//! Merges one trading day's per-cutoff snapshots into a long-format history
//! plus latest-as-of views per checkpoint. A checkpoint is only marked ready
//! when every cutoff up to and including it is present, so consumers never
//! read silently-incomplete aggregates. Re-running on the same inputs
//! reproduces byte-identical aggregate files.

pub mod manifest;

pub use manifest::*;

use cache_store::{atomic_write_csv, atomic_write_text, parse_snapshot_filename, read_snapshot};
use chrono::NaiveDate;
use scan_core::{ScanError, Slot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::info;

pub const RECON_HEADERS: &[&str] = &[
    "date",
    "slot",
    "slot_order",
    "ticker",
    "score",
    "vol_pace",
    "last",
    "price_at_cutoff",
    "daily_return",
    "closing_strength",
    "afternoon_power",
    "first_seen_slot",
    "last_seen_slot",
    "time_seen_count",
    "persist_count",
    "is_latest_for_ticker",
    "source_file",
];

/// One (date, ticker, cutoff) observation with its day-level aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconRow {
    pub date: NaiveDate,
    pub slot: String,
    pub slot_order: u32,
    pub ticker: String,
    pub score: f64,
    pub vol_pace: f64,
    pub last: f64,
    pub price_at_cutoff: f64,
    pub daily_return: f64,
    pub closing_strength: f64,
    pub afternoon_power: f64,
    pub first_seen_slot: String,
    pub last_seen_slot: String,
    pub time_seen_count: u32,
    pub persist_count: u32,
    pub is_latest_for_ticker: u8,
    pub source_file: String,
}

/// Where each output landed and what the day looked like.
#[derive(Debug, Clone)]
pub struct ReconOutcome {
    pub long_path: PathBuf,
    pub long_rows: usize,
    /// checkpoint hhmm → latest-view path and row count (None when empty)
    pub latest: BTreeMap<String, Option<(PathBuf, usize)>>,
    pub snapshots_present: BTreeMap<String, bool>,
    pub ready_for: BTreeMap<String, bool>,
    pub manifest_path: PathBuf,
}

pub struct SlotRecon {
    slots: Vec<Slot>,
}

impl SlotRecon {
    /// `slots` are the day's configured cutoffs, ascending.
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    fn slot_order(&self) -> BTreeMap<String, u32> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.hhmm(), i as u32 + 1))
            .collect()
    }

    /// Find the day's snapshot files, keyed by slot hhmm in slot order.
    /// Files for unconfigured slots are ignored.
    pub fn discover(
        &self,
        input_dir: &Path,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, PathBuf>, ScanError> {
        let order = self.slot_order();
        let mut found = BTreeMap::new();
        for entry in std::fs::read_dir(input_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some((file_date, hhmm)) = parse_snapshot_filename(name) {
                if file_date == date && order.contains_key(&hhmm) {
                    found.insert(hhmm, path);
                }
            }
        }
        Ok(found)
    }

    /// Long-format union of the available snapshots with per-ticker
    /// aggregates. Rows ordered by (ticker, slot_order).
    pub fn build_long(
        &self,
        snapshots: &BTreeMap<String, PathBuf>,
        date: NaiveDate,
    ) -> Result<Vec<ReconRow>, ScanError> {
        if snapshots.is_empty() {
            return Err(ScanError::InsufficientData(format!(
                "no snapshots found for {date}"
            )));
        }
        let order = self.slot_order();

        let mut rows: Vec<ReconRow> = Vec::new();
        for (hhmm, path) in snapshots {
            let slot_order = order[hhmm];
            let source_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            for snap in read_snapshot(path)? {
                rows.push(ReconRow {
                    date,
                    slot: hhmm.clone(),
                    slot_order,
                    ticker: snap.ticker,
                    score: snap.score,
                    vol_pace: snap.vol_pace,
                    last: snap.last,
                    price_at_cutoff: snap.price_at_cutoff,
                    daily_return: snap.daily_return,
                    closing_strength: snap.closing_strength,
                    afternoon_power: snap.afternoon_power,
                    first_seen_slot: String::new(),
                    last_seen_slot: String::new(),
                    time_seen_count: 0,
                    persist_count: 0,
                    is_latest_for_ticker: 0,
                    source_file: source_file.clone(),
                });
            }
        }

        // per-ticker aggregates over the whole day
        struct Agg {
            first: u32,
            last: u32,
            seen: Vec<u32>,
        }
        let mut aggregates: HashMap<String, Agg> = HashMap::new();
        for row in &rows {
            let entry = aggregates.entry(row.ticker.clone()).or_insert(Agg {
                first: row.slot_order,
                last: row.slot_order,
                seen: Vec::new(),
            });
            entry.first = entry.first.min(row.slot_order);
            entry.last = entry.last.max(row.slot_order);
            if !entry.seen.contains(&row.slot_order) {
                entry.seen.push(row.slot_order);
            }
        }

        let hhmm_of: BTreeMap<u32, String> =
            order.iter().map(|(k, v)| (*v, k.clone())).collect();
        for row in &mut rows {
            let agg = &aggregates[&row.ticker];
            row.first_seen_slot = hhmm_of[&agg.first].clone();
            row.last_seen_slot = hhmm_of[&agg.last].clone();
            row.time_seen_count = agg.seen.len() as u32;
            row.persist_count = row.time_seen_count;
            row.is_latest_for_ticker = (row.slot_order == agg.last) as u8;
        }

        rows.sort_by(|a, b| {
            a.ticker
                .cmp(&b.ticker)
                .then_with(|| a.slot_order.cmp(&b.slot_order))
        });
        Ok(rows)
    }

    /// Each ticker's most recent row at or before a checkpoint.
    pub fn latest_upto(&self, long: &[ReconRow], upto: &str) -> Vec<ReconRow> {
        let order = self.slot_order();
        let Some(&upto_order) = order.get(upto) else {
            return Vec::new();
        };
        let mut best: BTreeMap<String, &ReconRow> = BTreeMap::new();
        for row in long.iter().filter(|r| r.slot_order <= upto_order) {
            match best.get(&row.ticker) {
                Some(cur) if cur.slot_order >= row.slot_order => {}
                _ => {
                    best.insert(row.ticker.clone(), row);
                }
            }
        }
        best.into_values().cloned().collect()
    }

    /// Full reconciliation pass: long table, latest views, readiness
    /// sentinels, manifest. `generated_at` is recorded verbatim so the
    /// aggregate outputs themselves stay deterministic.
    pub fn build(
        &self,
        input_dir: &Path,
        out_dir: &Path,
        date: NaiveDate,
        generated_at: &str,
    ) -> Result<ReconOutcome, ScanError> {
        std::fs::create_dir_all(out_dir)?;
        let snapshots = self.discover(input_dir, date)?;
        let snapshots_present: BTreeMap<String, bool> = self
            .slots
            .iter()
            .map(|s| {
                let hhmm = s.hhmm();
                let present = snapshots.contains_key(&hhmm);
                (hhmm, present)
            })
            .collect();

        let long = self.build_long(&snapshots, date)?;
        let long_path = out_dir.join(format!("recon_{date}_long.csv"));
        atomic_write_csv(&long_path, RECON_HEADERS, &long)?;

        let mut outputs: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut checksums: BTreeMap<String, OutputChecksum> = BTreeMap::new();
        outputs.insert(
            "long".into(),
            Some(long_path.to_string_lossy().into_owned()),
        );
        checksums.insert(
            "long".into(),
            OutputChecksum {
                sha256: sha256_file(&long_path).ok(),
                rows: Some(long.len()),
            },
        );

        let mut latest_outcome: BTreeMap<String, Option<(PathBuf, usize)>> = BTreeMap::new();
        for slot in &self.slots {
            let hhmm = slot.hhmm();
            let view = self.latest_upto(&long, &hhmm);
            let key = format!("latest_upto_{hhmm}");
            if view.is_empty() {
                latest_outcome.insert(hhmm, None);
                outputs.insert(key.clone(), None);
                checksums.insert(
                    key,
                    OutputChecksum {
                        sha256: None,
                        rows: None,
                    },
                );
                continue;
            }
            let path = out_dir.join(format!("recon_{date}_latest_upto_{hhmm}.csv"));
            atomic_write_csv(&path, RECON_HEADERS, &view)?;
            outputs.insert(key.clone(), Some(path.to_string_lossy().into_owned()));
            checksums.insert(
                key,
                OutputChecksum {
                    sha256: sha256_file(&path).ok(),
                    rows: Some(view.len()),
                },
            );
            latest_outcome.insert(hhmm, Some((path, view.len())));
        }

        // a checkpoint is ready only when every slot up to it is present
        let mut ready_for: BTreeMap<String, bool> = BTreeMap::new();
        let mut all_so_far = true;
        for slot in &self.slots {
            let hhmm = slot.hhmm();
            all_so_far = all_so_far && snapshots_present[&hhmm];
            ready_for.insert(hhmm.clone(), all_so_far);

            let sentinel = out_dir.join(format!(".recon_ready_{date}_{hhmm}"));
            if all_so_far {
                atomic_write_text(&sentinel, &format!("ready:{date}:{hhmm}\n"))?;
            } else if sentinel.exists() {
                std::fs::remove_file(&sentinel)?;
            }
        }

        let manifest = ReconManifest {
            date: date.to_string(),
            generated_at: generated_at.to_string(),
            snapshots_present: snapshots_present.clone(),
            ready_for: ready_for.clone(),
            outputs,
            checksums,
        };
        let manifest_path = out_dir.join(format!("recon_manifest_{date}.json"));
        manifest.write(&manifest_path)?;

        info!(
            %date,
            rows = long.len(),
            snapshots = snapshots.len(),
            "reconciliation built"
        );

        Ok(ReconOutcome {
            long_path,
            long_rows: long.len(),
            latest: latest_outcome,
            snapshots_present,
            ready_for,
            manifest_path,
        })
    }
}
