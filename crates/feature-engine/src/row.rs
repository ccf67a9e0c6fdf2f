use chrono::NaiveDate;
use scan_core::DropReason;
use serde::{Deserialize, Serialize};

/// One ticker's feature vector at one cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub price_at_cutoff: f64,
    pub last: f64,
    pub daily_return: f64,
    pub closing_strength: f64,
    pub afternoon_power: f64,
    pub vol_pace: f64,
    /// Minute-of-day volume anomaly; None when the historical profile has no
    /// usable variance
    pub zvol: Option<f64>,
    pub vwap_dev: f64,
    /// Qualifying bars in the trailing persistence window
    pub persistence: u32,
    pub spread: f64,
    pub buy_pressure: f64,
    pub score: f64,
    /// Distinct same-day cutoffs this ticker has appeared in so far
    pub persist_count: u32,
}

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Candidate(CandidateRow),
    Dropped(DropReason),
}

impl Extraction {
    pub fn candidate(self) -> Option<CandidateRow> {
        match self {
            Extraction::Candidate(row) => Some(row),
            Extraction::Dropped(_) => None,
        }
    }
}
