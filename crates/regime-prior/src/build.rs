//! Offline prior construction from a daily OHLCV corpus.
//!
//! One pass learns the decile edges, a second buckets every corpus row with
//! those same edges and aggregates forward-labeled outcomes per regime key.
//! Build-time and score-time bucketing therefore agree by construction.
//! Rows with tiny support are kept; the support column lets the consumer
//! discount them.

use crate::edges::DecileEdges;
use crate::key::{GapBucket, RegimeKey};
use crate::table::{PriorRow, PriorTable};
use cache_store::{read_ohlcv_csv, Series};
use scan_core::{LabelConfig, ScanConfig, ScanError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One corpus session with its derived regime features.
struct DayRow {
    open: f64,
    high: f64,
    close: f64,
    turnover: f64,
    atr14: f64,
    gap: f64,
}

/// Recursively collect `.csv` files under a corpus directory.
fn walk_csv_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ScanError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_csv_files(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            out.push(path);
        }
    }
    Ok(())
}

fn corpus_files(daily_dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    walk_csv_files(daily_dir, &mut files)?;
    if files.is_empty() {
        return Err(ScanError::InsufficientData(format!(
            "no csv files under {}",
            daily_dir.display()
        )));
    }
    files.sort();
    Ok(files)
}

/// Per-session regime features for one ticker's daily series.
fn day_rows(series: &Series) -> Vec<DayRow> {
    let bars = &series.bars;
    let mut rows = Vec::with_capacity(bars.len());
    let mut range_window: Vec<f64> = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        range_window.push(bar.high - bar.low);
        let start = range_window.len().saturating_sub(14);
        let recent = &range_window[start..];
        let atr14 = recent.iter().sum::<f64>() / recent.len() as f64;

        let turnover = if series.has_volume {
            bar.close * bar.volume
        } else {
            bar.close
        };

        let gap = if i == 0 {
            0.0
        } else {
            let prev_close = bars[i - 1].close;
            if prev_close > 0.0 {
                bar.open / prev_close - 1.0
            } else {
                0.0
            }
        };

        rows.push(DayRow {
            open: bar.open,
            high: bar.high,
            close: bar.close,
            turnover,
            atr14,
            gap: if gap.is_finite() { gap } else { 0.0 },
        });
    }
    rows
}

/// Latest-session regime inputs for one ticker, straight from its daily
/// series. What the scorer buckets at lookup time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyStats {
    pub turnover: f64,
    pub atr14: f64,
    pub gap: f64,
}

impl Default for DailyStats {
    /// Mid-distribution stand-in for tickers with no readable daily cache.
    fn default() -> Self {
        Self {
            turnover: 1e9,
            atr14: 25.0,
            gap: 0.0,
        }
    }
}

/// Regime inputs from the most recent session of a daily series.
pub fn latest_daily_stats(series: &Series) -> DailyStats {
    let rows = day_rows(series);
    match rows.last() {
        Some(row) => DailyStats {
            turnover: row.turnover,
            atr14: row.atr14,
            gap: row.gap,
        },
        None => DailyStats::default(),
    }
}

/// Learn the decile-edge reference from the whole corpus.
pub fn build_decile_edges(daily_dir: &Path) -> Result<DecileEdges, ScanError> {
    let files = corpus_files(daily_dir)?;
    let mut turnover = Vec::new();
    let mut atr14 = Vec::new();
    let mut skipped = 0usize;

    for path in &files {
        let Some(series) = read_ohlcv_csv(path) else {
            skipped += 1;
            debug!(path = %path.display(), "skipping unreadable corpus file");
            continue;
        };
        for row in day_rows(&series) {
            turnover.push(row.turnover);
            atr14.push(row.atr14);
        }
    }
    info!(
        files = files.len(),
        skipped,
        samples = turnover.len(),
        "learned decile edges"
    );
    DecileEdges::learn(&turnover, &atr14)
}

/// Forward-labeled outcomes for one session.
struct Outcomes {
    eod_hold: bool,
    am3_up: bool,
    d2_continue: bool,
}

fn label_outcomes(rows: &[DayRow], i: usize, labels: &LabelConfig) -> Outcomes {
    let row = &rows[i];
    let eod_hold = row.close >= row.open * (1.0 - labels.eod_epsilon);

    let next = rows.get(i + labels.next_session);
    let am3_up = next
        .map(|n| n.open > 0.0 && n.high / n.open - 1.0 >= labels.morning_threshold)
        .unwrap_or(false);

    let cont1 = next.map(|n| n.close >= n.open).unwrap_or(false);
    let cont2 = rows
        .get(i + labels.continuation_session)
        .map(|n| n.close >= n.open)
        .unwrap_or(false);

    Outcomes {
        eod_hold,
        am3_up,
        d2_continue: cont1 || cont2,
    }
}

#[derive(Default)]
struct Acc {
    eod: u64,
    am3: u64,
    d2: u64,
    n: u64,
}

/// Build the transition-prior table from a daily corpus using previously
/// learned edges.
pub fn build_prior_table(
    daily_dir: &Path,
    edges: &DecileEdges,
    cfg: &ScanConfig,
) -> Result<PriorTable, ScanError> {
    let files = corpus_files(daily_dir)?;
    let mut acc: BTreeMap<RegimeKey, Acc> = BTreeMap::new();
    let mut skipped = 0usize;
    let mut total_rows = 0usize;

    for path in &files {
        let Some(series) = read_ohlcv_csv(path) else {
            skipped += 1;
            debug!(path = %path.display(), "skipping unreadable corpus file");
            continue;
        };
        let rows = day_rows(&series);
        for i in 0..rows.len() {
            let row = &rows[i];
            let key = RegimeKey {
                sector: cfg.sector_default.clone(),
                liq_bucket: edges.bucket_turnover(row.turnover),
                vol_bucket: edges.bucket_atr14(row.atr14),
                gap_bucket: GapBucket::from_gap(row.gap, cfg.gap_flat_band),
            };
            let outcomes = label_outcomes(&rows, i, &cfg.labels);
            let entry = acc.entry(key).or_default();
            entry.n += 1;
            entry.eod += outcomes.eod_hold as u64;
            entry.am3 += outcomes.am3_up as u64;
            entry.d2 += outcomes.d2_continue as u64;
            total_rows += 1;
        }
    }

    if acc.is_empty() {
        return Err(ScanError::InsufficientData(format!(
            "no labelable rows under {}",
            daily_dir.display()
        )));
    }

    let rows: Vec<PriorRow> = acc
        .into_iter()
        .map(|(key, a)| PriorRow {
            sector: key.sector,
            liquidity_bucket: key.liq_bucket,
            volatility_bucket: key.vol_bucket,
            gap_bucket: key.gap_bucket,
            pi_s0_s1: a.eod as f64 / a.n as f64,
            pi_s1_s2: a.am3 as f64 / a.n as f64,
            pi_s2_s3: a.d2 as f64 / a.n as f64,
            support: a.n,
        })
        .collect();

    info!(
        files = files.len(),
        skipped,
        rows = total_rows,
        regimes = rows.len(),
        "built transition prior"
    );
    Ok(PriorTable::from_rows(rows))
}
