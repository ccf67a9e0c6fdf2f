use crate::profile::MinuteProfile;
use crate::row::{CandidateRow, Extraction};
use cache_store::{OhlcvCache, Series};
use chrono::{NaiveDate, NaiveTime};
use scan_core::{adaptive, Bar, DropReason, DropSummary, Resolution, ScanConfig, Slot};
use tracing::debug;

/// Computes feature vectors from cached bars. Stateless between calls:
/// the same cached inputs always produce the same vector.
pub struct FeatureEngine {
    cache: OhlcvCache,
    cfg: ScanConfig,
}

/// Bars of one session at or before the cutoff.
fn cut_slice<'a>(series: &'a Series, date: NaiveDate, cutoff: NaiveTime) -> &'a [Bar] {
    let day = series.day(date);
    let end = day.partition_point(|b| b.timestamp.time() <= cutoff);
    &day[..end]
}

fn cut_volume(series: &Series, date: NaiveDate, cutoff: NaiveTime) -> f64 {
    cut_slice(series, date, cutoff).iter().map(|b| b.volume).sum()
}

/// Positive same-cutoff cumulative volumes over the trailing sessions.
fn baseline_cut_volumes(
    series: &Series,
    date: NaiveDate,
    cutoff: NaiveTime,
    n_days: usize,
) -> Vec<f64> {
    let sessions: Vec<NaiveDate> = series
        .session_dates()
        .into_iter()
        .filter(|d| *d < date)
        .collect();
    let start = sessions.len().saturating_sub(n_days);
    sessions[start..]
        .iter()
        .map(|d| cut_volume(series, *d, cutoff))
        .filter(|v| *v > 0.0)
        .collect()
}

impl FeatureEngine {
    pub fn new(cache: OhlcvCache, cfg: ScanConfig) -> Self {
        Self { cache, cfg }
    }

    pub fn cache(&self) -> &OhlcvCache {
        &self.cache
    }

    pub fn config(&self) -> &ScanConfig {
        &self.cfg
    }

    /// Latest session date at or before `not_after` anywhere in the 1-minute
    /// cache. Used when no target date is given.
    pub fn latest_session(&self, not_after: NaiveDate) -> Option<NaiveDate> {
        let mut latest = None;
        for ticker in self.cache.tickers() {
            let Some(series) = self.cache.load(Resolution::Min1, &ticker) else {
                continue;
            };
            let candidate = series
                .session_dates()
                .into_iter()
                .filter(|d| *d <= not_after)
                .next_back();
            if let Some(d) = candidate {
                latest = Some(latest.map_or(d, |cur: NaiveDate| cur.max(d)));
            }
        }
        latest
    }

    /// Extract features for every ticker in the cache, collecting drop
    /// reasons. Candidates come back sorted by composite score, strongest
    /// first.
    pub fn extract_universe(
        &self,
        date: NaiveDate,
        cutoff: Slot,
    ) -> (Vec<CandidateRow>, DropSummary) {
        let mut candidates = Vec::new();
        let mut drops = DropSummary::new();
        for ticker in self.cache.tickers() {
            match self.extract(&ticker, date, cutoff) {
                Extraction::Candidate(row) => candidates.push(row),
                Extraction::Dropped(reason) => {
                    debug!(ticker = %ticker, %reason, "excluded");
                    drops.record(reason);
                }
            }
        }
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        (candidates, drops)
    }

    /// Feature vector for one ticker at one cutoff, or a typed drop.
    pub fn extract(&self, ticker: &str, date: NaiveDate, cutoff: Slot) -> Extraction {
        let cutoff_time = cutoff.time();
        let min1 = self.cache.load(Resolution::Min1, ticker);
        let min5 = self.cache.load(Resolution::Min5, ticker);
        let min15 = self.cache.load(Resolution::Min15, ticker);
        let daily = self.cache.load(Resolution::Daily, ticker);

        // price source: finest intraday series that exists
        let Some(price_series) = min1.as_ref().or(min5.as_ref()).or(min15.as_ref()) else {
            return Extraction::Dropped(DropReason::NoData);
        };

        let day_cut = cut_slice(price_series, date, cutoff_time);
        let Some(last_bar) = day_cut.last() else {
            return Extraction::Dropped(DropReason::NoData);
        };
        let last = last_bar.close;
        if last <= 0.0 {
            return Extraction::Dropped(DropReason::NoData);
        }

        let Some(prev_close) = previous_close(daily.as_ref(), price_series, date) else {
            return Extraction::Dropped(DropReason::NoData);
        };
        let daily_return = last / prev_close - 1.0;
        if daily_return < self.cfg.ret_min || daily_return > self.cfg.ret_max {
            return Extraction::Dropped(DropReason::ReturnOutOfRange);
        }

        let Some(vol_pace) = self.volume_pace(
            [min1.as_ref(), min5.as_ref(), min15.as_ref()],
            daily.as_ref(),
            date,
            cutoff_time,
        ) else {
            return Extraction::Dropped(DropReason::PaceTooLow);
        };
        if vol_pace < self.cfg.pace_min {
            return Extraction::Dropped(DropReason::PaceTooLow);
        }

        // minute-level features want real 1-minute bars
        let (zvol, persistence) = match min1.as_ref() {
            Some(series) => {
                let profile = MinuteProfile::build(series, date, self.cfg.zvol.window_days);
                let day_1m = cut_slice(series, date, cutoff_time);
                let zvol = day_1m
                    .last()
                    .and_then(|bar| profile.z_score(bar.timestamp.time(), bar.volume));
                let persistence = self.persistence(day_1m, &profile);
                (zvol, persistence)
            }
            None => (None, 0),
        };
        if let (Some(gate), Some(z)) = (self.cfg.zvol.gate_min, zvol) {
            if z < gate {
                return Extraction::Dropped(DropReason::AnomalyTooLow);
            }
        }
        if self.cfg.persistence.min_count > 0
            && (persistence as usize) < self.cfg.persistence.min_count
        {
            return Extraction::Dropped(DropReason::InsufficientPersistence);
        }

        let spread = self.spread_proxy(price_series, day_cut);
        if let Some(max) = self.cfg.spread.max {
            if spread > max {
                return Extraction::Dropped(DropReason::SpreadTooWide);
            }
        }

        let vwap_dev = vwap_deviation(day_cut, last);
        let afternoon_power = self.afternoon_power(day_cut, cutoff_time);
        let buy_pressure = self.buy_pressure(day_cut);
        let closing_strength = closing_strength(day_cut, last);

        let price_term =
            (1.0 + daily_return) * (1.0 + afternoon_power.max(0.0)) * closing_strength;
        let score = price_term * (1.0 + vol_pace.min(50.0)).ln();

        Extraction::Candidate(CandidateRow {
            ticker: ticker.to_string(),
            date,
            price_at_cutoff: last,
            last,
            daily_return,
            closing_strength,
            afternoon_power,
            vol_pace,
            zvol,
            vwap_dev,
            persistence,
            spread,
            buy_pressure,
            score,
            persist_count: 1,
        })
    }

    /// Volume pace with the resolution fallback cascade. Finer bars give a
    /// truer same-time-of-day baseline; the daily approximation is the
    /// always-available last resort.
    fn volume_pace(
        &self,
        intraday: [Option<&Series>; 3],
        daily: Option<&Series>,
        date: NaiveDate,
        cutoff: NaiveTime,
    ) -> Option<f64> {
        for series in intraday.iter().flatten() {
            let history =
                baseline_cut_volumes(series, date, cutoff, self.cfg.baseline_days);
            if history.len() < self.cfg.pace.min_intraday_obs {
                continue;
            }
            let base = adaptive::median(&history);
            if base > 0.0 {
                return Some(cut_volume(series, date, cutoff) / base);
            }
        }

        // daily approximation: scale the median full-day volume down to a
        // partial-day figure
        let daily = daily?;
        let history: Vec<f64> = daily
            .bars
            .iter()
            .filter(|b| b.timestamp.date() < date)
            .map(|b| b.volume)
            .collect();
        let start = history.len().saturating_sub(self.cfg.baseline_days);
        let history = &history[start..];
        if history.len() < self.cfg.pace.min_daily_obs {
            return None;
        }
        let base = adaptive::median(history);
        if base <= 0.0 {
            return None;
        }
        let today = intraday
            .iter()
            .flatten()
            .map(|s| cut_volume(s, date, cutoff))
            .find(|v| *v > 0.0)?;
        Some(today / (base * self.cfg.pace.daily_cut_factor))
    }

    /// Qualifying bars in the trailing window: a bar counts on (positive
    /// 1-minute return AND strong anomaly) or (above running VWAP AND milder
    /// anomaly). Guards against acting on a single-bar spike.
    fn persistence(&self, day_1m: &[Bar], profile: &MinuteProfile) -> u32 {
        let window_start = day_1m.len().saturating_sub(self.cfg.persistence.window_bars);
        let mut cum_pv = 0.0;
        let mut cum_v = 0.0;
        let mut count = 0u32;

        for (i, bar) in day_1m.iter().enumerate() {
            cum_pv += bar.close * bar.volume;
            cum_v += bar.volume;
            if i < window_start {
                continue;
            }
            let vwap = if cum_v > 0.0 { cum_pv / cum_v } else { bar.close };
            let ret = if i == 0 {
                if bar.open > 0.0 {
                    bar.close / bar.open - 1.0
                } else {
                    0.0
                }
            } else {
                let prev = day_1m[i - 1].close;
                if prev > 0.0 {
                    bar.close / prev - 1.0
                } else {
                    0.0
                }
            };
            let qualifies = match profile.z_score(bar.timestamp.time(), bar.volume) {
                Some(z) => {
                    (ret > 0.0 && z >= self.cfg.persistence.zvol_up)
                        || (bar.close > vwap && z >= self.cfg.persistence.zvol_vwap)
                }
                None => false,
            };
            if qualifies {
                count += 1;
            }
        }
        count
    }

    /// Mean relative bar range over the trailing window; close-to-close when
    /// the source carried no high/low.
    fn spread_proxy(&self, series: &Series, day_cut: &[Bar]) -> f64 {
        let start = day_cut.len().saturating_sub(self.cfg.spread.window_bars);
        let window = &day_cut[start..];
        if window.is_empty() {
            return 0.0;
        }
        let mut values = Vec::with_capacity(window.len());
        if series.has_range {
            for bar in window {
                if bar.close > 0.0 {
                    values.push((bar.high - bar.low) / bar.close);
                }
            }
        } else {
            for (i, bar) in day_cut.iter().enumerate() {
                if i < start.max(1) {
                    continue;
                }
                if bar.close > 0.0 {
                    values.push((bar.close - day_cut[i - 1].close).abs() / bar.close);
                }
            }
        }
        adaptive::mean(&values)
    }

    /// Share of the day's volume after the post-lunch boundary; zero by
    /// definition at cutoffs that end before the boundary.
    fn afternoon_power(&self, day_cut: &[Bar], cutoff: NaiveTime) -> f64 {
        if cutoff <= self.cfg.afternoon_boundary {
            return 0.0;
        }
        let total: f64 = day_cut.iter().map(|b| b.volume).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let after: f64 = day_cut
            .iter()
            .filter(|b| b.timestamp.time() > self.cfg.afternoon_boundary)
            .map(|b| b.volume)
            .sum();
        after / total
    }

    /// Share of trailing-window volume in up bars (close above open).
    fn buy_pressure(&self, day_cut: &[Bar]) -> f64 {
        let start = day_cut.len().saturating_sub(self.cfg.persistence.window_bars);
        let window = &day_cut[start..];
        let total: f64 = window.iter().map(|b| b.volume).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let up: f64 = window
            .iter()
            .filter(|b| b.close > b.open)
            .map(|b| b.volume)
            .sum();
        up / total
    }
}

/// Previous session's close: daily cache preferred, intraday fallback.
fn previous_close(
    daily: Option<&Series>,
    intraday: &Series,
    date: NaiveDate,
) -> Option<f64> {
    if let Some(series) = daily {
        if let Some(bar) = series
            .bars
            .iter()
            .rev()
            .find(|b| b.timestamp.date() < date && b.close > 0.0)
        {
            return Some(bar.close);
        }
    }
    let prev_session = intraday
        .session_dates()
        .into_iter()
        .filter(|d| *d < date)
        .next_back()?;
    intraday
        .day(prev_session)
        .last()
        .map(|b| b.close)
        .filter(|c| *c > 0.0)
}

/// Deviation of the last price from the session's cumulative VWAP.
fn vwap_deviation(day_cut: &[Bar], last: f64) -> f64 {
    let cum_v: f64 = day_cut.iter().map(|b| b.volume).sum();
    if cum_v <= 0.0 {
        return 0.0;
    }
    let cum_pv: f64 = day_cut.iter().map(|b| b.close * b.volume).sum();
    let vwap = cum_pv / cum_v;
    if vwap <= 0.0 {
        return 0.0;
    }
    (last - vwap) / vwap
}

/// Position of the last price in the session range; a zero range counts as
/// full strength.
fn closing_strength(day_cut: &[Bar], last: f64) -> f64 {
    let high = day_cut.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = day_cut.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let range = high - low;
    if range > 0.0 {
        (last - low) / range
    } else {
        1.0
    }
}
