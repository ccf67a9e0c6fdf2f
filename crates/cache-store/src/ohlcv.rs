//! Cached OHLCV tables, one CSV per ticker per resolution.
//!
//! Input files come from several fetchers and vendors, so column names are
//! normalized before use: `Datetime` or `Date` (+ optional `Time`), `Close`
//! or `Adj Close`, in any casing, with spaces or underscores. A missing or
//! unreadable file is missing data for that ticker, never an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use scan_core::{Bar, Resolution};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory per resolution, resolved once at startup.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    pub min1: PathBuf,
    pub min5: PathBuf,
    pub min15: PathBuf,
    pub daily: PathBuf,
}

impl CacheLayout {
    /// Conventional layout under a single data root.
    pub fn under(root: &Path) -> Self {
        Self {
            min1: root.join("cache_1m"),
            min5: root.join("cache_5m"),
            min15: root.join("cache_15m"),
            daily: root.join("cache_daily"),
        }
    }

    pub fn dir(&self, resolution: Resolution) -> &Path {
        match resolution {
            Resolution::Min1 => &self.min1,
            Resolution::Min5 => &self.min5,
            Resolution::Min15 => &self.min15,
            Resolution::Daily => &self.daily,
        }
    }
}

/// A loaded bar series. `has_range` records whether the source carried real
/// high/low columns (without them the spread proxy degrades to
/// close-to-close); `has_volume` whether a volume column existed at all.
#[derive(Debug, Clone)]
pub struct Series {
    pub bars: Vec<Bar>,
    pub has_range: bool,
    pub has_volume: bool,
}

impl Series {
    /// Distinct session dates, ascending.
    pub fn session_dates(&self) -> Vec<NaiveDate> {
        let set: BTreeSet<NaiveDate> =
            self.bars.iter().map(|b| b.timestamp.date()).collect();
        set.into_iter().collect()
    }

    /// Bars belonging to one session date.
    pub fn day(&self, date: NaiveDate) -> &[Bar] {
        let start = self.bars.partition_point(|b| b.timestamp.date() < date);
        let end = self.bars.partition_point(|b| b.timestamp.date() <= date);
        &self.bars[start..end]
    }
}

pub struct OhlcvCache {
    layout: CacheLayout,
}

impl OhlcvCache {
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Load one ticker at one resolution. None when the file is absent or
    /// nothing in it parses.
    pub fn load(&self, resolution: Resolution, ticker: &str) -> Option<Series> {
        let path = self.layout.dir(resolution).join(format!("{ticker}.csv"));
        read_ohlcv_csv(&path)
    }

    /// Ticker universe: union of file stems across the intraday caches.
    pub fn tickers(&self) -> Vec<String> {
        let mut set = BTreeSet::new();
        for resolution in Resolution::intraday() {
            let dir = self.layout.dir(resolution);
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        set.insert(stem.to_string());
                    }
                }
            }
        }
        set.into_iter().collect()
    }
}

fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    // Vendor exports sometimes carry a UTC offset; keep the local wall clock.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.naive_local());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

fn parse_number(field: Option<&str>) -> Option<f64> {
    field.and_then(|s| s.trim().parse::<f64>().ok()).filter(|v| v.is_finite())
}

/// Read and normalize one OHLCV CSV. Rows without a parsable timestamp or
/// close are skipped; duplicate timestamps keep the last row so the series
/// stays strictly increasing. None when the file is absent, unreadable, or
/// yields no bars.
pub fn read_ohlcv_csv(path: &Path) -> Option<Series> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .ok()?;

    let headers: HashMap<String, usize> = reader
        .headers()
        .ok()?
        .iter()
        .enumerate()
        .map(|(i, h)| (normalize_header(h), i))
        .collect();

    let col = |names: &[&str]| -> Option<usize> {
        names.iter().find_map(|n| headers.get(*n).copied())
    };

    let ts_col = col(&["datetime"]);
    let date_col = col(&["date"]);
    let time_col = col(&["time"]);
    let open_col = col(&["open"]);
    let high_col = col(&["high"]);
    let low_col = col(&["low"]);
    let close_col = col(&["close", "adj_close"]);
    let volume_col = col(&["volume"]);

    close_col?;
    if ts_col.is_none() && date_col.is_none() {
        debug!(path = %path.display(), "no datetime or date column");
        return None;
    }

    let has_range = high_col.is_some() && low_col.is_some();
    let mut bars: Vec<Bar> = Vec::new();

    for record in reader.records().flatten() {
        let get = |idx: Option<usize>| idx.and_then(|i| record.get(i));

        let timestamp = match (get(ts_col), get(date_col), get(time_col)) {
            (Some(ts), _, _) => parse_timestamp(ts),
            (None, Some(d), Some(t)) => parse_timestamp(&format!("{} {}", d.trim(), t.trim())),
            (None, Some(d), None) => parse_timestamp(d),
            _ => None,
        };
        let Some(timestamp) = timestamp else { continue };
        let Some(close) = parse_number(get(close_col)) else {
            continue;
        };

        let open = parse_number(get(open_col)).unwrap_or(close);
        let high = parse_number(get(high_col)).unwrap_or(close);
        let low = parse_number(get(low_col)).unwrap_or(close);
        let volume = parse_number(get(volume_col)).unwrap_or(0.0).max(0.0);

        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by(|next, prev| {
        if next.timestamp == prev.timestamp {
            *prev = next.clone();
            true
        } else {
            false
        }
    });

    if bars.is_empty() {
        return None;
    }
    Some(Series {
        bars,
        has_range,
        has_volume: volume_col.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn cache(root: &Path) -> OhlcvCache {
        let layout = CacheLayout::under(root);
        for d in [&layout.min1, &layout.min5, &layout.min15, &layout.daily] {
            fs::create_dir_all(d).unwrap();
        }
        OhlcvCache::new(layout)
    }

    #[test]
    fn test_load_standard_columns() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        write(
            &cache.layout().min1,
            "AAA.csv",
            "Datetime,Open,High,Low,Close,Volume\n\
             2025-08-27 09:00:00,100,101,99,100.5,1000\n\
             2025-08-27 09:01:00,100.5,102,100,101,1200\n",
        );
        let series = cache.load(Resolution::Min1, "AAA").unwrap();
        assert_eq!(series.bars.len(), 2);
        assert!(series.has_range);
        assert_eq!(series.bars[1].close, 101.0);
    }

    #[test]
    fn test_load_lowercase_adj_close_alias() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        write(
            &cache.layout().daily,
            "AAA.csv",
            "date,open,high,low,adj close,volume\n\
             2025-08-26,100,105,95,102,50000\n\
             2025-08-27,102,110,101,108,60000\n",
        );
        let series = cache.load(Resolution::Daily, "AAA").unwrap();
        assert_eq!(series.bars.len(), 2);
        assert_eq!(series.bars[0].close, 102.0);
    }

    #[test]
    fn test_load_missing_high_low_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        write(
            &cache.layout().min1,
            "BBB.csv",
            "Datetime,Close,Volume\n\
             2025-08-27 09:00:00,50,100\n",
        );
        let series = cache.load(Resolution::Min1, "BBB").unwrap();
        assert!(!series.has_range);
        assert_eq!(series.bars[0].high, 50.0);
        assert_eq!(series.bars[0].low, 50.0);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        assert!(cache.load(Resolution::Min1, "ZZZ").is_none());
    }

    #[test]
    fn test_load_skips_bad_rows_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        write(
            &cache.layout().min1,
            "CCC.csv",
            "Datetime,Close,Volume\n\
             2025-08-27 09:05:00,51,100\n\
             not-a-time,50,100\n\
             2025-08-27 09:01:00,49,100\n\
             2025-08-27 09:01:00,49.5,150\n",
        );
        let series = cache.load(Resolution::Min1, "CCC").unwrap();
        assert_eq!(series.bars.len(), 2);
        // sorted, duplicate timestamp keeps the last row
        assert_eq!(series.bars[0].close, 49.5);
        assert_eq!(series.bars[1].close, 51.0);
        assert!(series.bars[0].timestamp < series.bars[1].timestamp);
    }

    #[test]
    fn test_negative_volume_coerced_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        write(
            &cache.layout().min1,
            "DDD.csv",
            "Datetime,Close,Volume\n2025-08-27 09:00:00,50,-5\n",
        );
        let series = cache.load(Resolution::Min1, "DDD").unwrap();
        assert_eq!(series.bars[0].volume, 0.0);
    }

    #[test]
    fn test_tickers_union_across_intraday_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        write(&cache.layout().min1, "AAA.csv", "Datetime,Close\n");
        write(&cache.layout().min5, "BBB.csv", "Datetime,Close\n");
        write(&cache.layout().min15, "AAA.csv", "Datetime,Close\n");
        assert_eq!(cache.tickers(), vec!["AAA".to_string(), "BBB".to_string()]);
    }

    #[test]
    fn test_session_day_slicing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        write(
            &cache.layout().min1,
            "EEE.csv",
            "Datetime,Close,Volume\n\
             2025-08-26 09:00:00,10,1\n\
             2025-08-27 09:00:00,11,1\n\
             2025-08-27 09:01:00,12,1\n",
        );
        let series = cache.load(Resolution::Min1, "EEE").unwrap();
        let d = NaiveDate::from_ymd_opt(2025, 8, 27).unwrap();
        assert_eq!(series.day(d).len(), 2);
        assert_eq!(series.session_dates().len(), 2);
    }
}
