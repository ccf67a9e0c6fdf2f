use crate::error::ScanError;
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// OHLCV bar in session-local time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Cached bar resolutions, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Min1,
    Min5,
    Min15,
    Daily,
}

impl Resolution {
    /// Human-readable name, matches cache directory suffixes
    pub fn name(&self) -> &'static str {
        match self {
            Resolution::Min1 => "1m",
            Resolution::Min5 => "5m",
            Resolution::Min15 => "15m",
            Resolution::Daily => "daily",
        }
    }

    /// Intraday resolutions in fallback order (finest preferred)
    pub fn intraday() -> [Resolution; 3] {
        [Resolution::Min1, Resolution::Min5, Resolution::Min15]
    }

    pub fn all() -> [Resolution; 4] {
        [
            Resolution::Min1,
            Resolution::Min5,
            Resolution::Min15,
            Resolution::Daily,
        ]
    }
}

/// A daily cutoff slot. Snapshots are scored per slot; filenames carry the
/// compact HHMM form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Slot(NaiveTime);

impl Slot {
    pub fn new(time: NaiveTime) -> Self {
        Slot(time)
    }

    /// Parse "HH:MM" or compact "HHMM"
    pub fn parse(s: &str) -> Result<Self, ScanError> {
        let fmt = if s.contains(':') { "%H:%M" } else { "%H%M" };
        NaiveTime::parse_from_str(s, fmt)
            .map(Slot)
            .map_err(|_| ScanError::InvalidData(format!("bad cutoff '{s}'")))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// Compact form used in output filenames, e.g. "0930"
    pub fn hhmm(&self) -> String {
        self.0.format("%H%M").to_string()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Why a ticker was excluded from a cutoff's batch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DropReason {
    /// No usable OHLCV source at any resolution, or no price at the cutoff
    NoData,
    /// Return-to-cutoff outside the admissible range
    ReturnOutOfRange,
    /// Volume pace below the floor, or no pace baseline at all
    PaceTooLow,
    /// Minute-volume anomaly score defined but below the gate
    AnomalyTooLow,
    /// Too few persistent bars in the trailing window
    InsufficientPersistence,
    /// Micro-spread proxy above the maximum
    SpreadTooWide,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::NoData => "no_data",
            DropReason::ReturnOutOfRange => "return_out_of_range",
            DropReason::PaceTooLow => "pace_too_low",
            DropReason::AnomalyTooLow => "anomaly_too_low",
            DropReason::InsufficientPersistence => "insufficient_persistence",
            DropReason::SpreadTooWide => "spread_too_wide",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multiset of drop reasons collected over one scan run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropSummary {
    counts: BTreeMap<DropReason, usize>,
}

impl DropSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: DropReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &DropSummary) {
        for (&reason, &n) in &other.counts {
            *self.counts.entry(reason).or_insert(0) += n;
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    /// Reasons by descending frequency, for the end-of-run diagnostics
    pub fn most_common(&self) -> Vec<(DropReason, usize)> {
        let mut v: Vec<(DropReason, usize)> =
            self.counts.iter().map(|(&r, &n)| (r, n)).collect();
        v.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        v
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parse_both_forms() {
        let a = Slot::parse("09:30").unwrap();
        let b = Slot::parse("0930").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hhmm(), "0930");
        assert_eq!(a.to_string(), "09:30");
    }

    #[test]
    fn test_slot_parse_rejects_garbage() {
        assert!(Slot::parse("25:99").is_err());
        assert!(Slot::parse("morning").is_err());
    }

    #[test]
    fn test_slot_ordering() {
        let open = Slot::parse("0930").unwrap();
        let close = Slot::parse("1415").unwrap();
        assert!(open < close);
    }

    #[test]
    fn test_drop_summary_counts_and_order() {
        let mut s = DropSummary::new();
        s.record(DropReason::PaceTooLow);
        s.record(DropReason::PaceTooLow);
        s.record(DropReason::NoData);
        assert_eq!(s.total(), 3);
        assert_eq!(s.count(DropReason::PaceTooLow), 2);
        assert_eq!(s.most_common()[0].0, DropReason::PaceTooLow);
    }

    #[test]
    fn test_drop_summary_merge() {
        let mut a = DropSummary::new();
        a.record(DropReason::NoData);
        let mut b = DropSummary::new();
        b.record(DropReason::NoData);
        b.record(DropReason::SpreadTooWide);
        a.merge(&b);
        assert_eq!(a.count(DropReason::NoData), 2);
        assert_eq!(a.total(), 3);
    }
}
