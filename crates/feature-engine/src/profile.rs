//! Minute-of-day volume profile.
//!
//! Each minute of the session has its own historical distribution; a volume
//! spike at 09:31 is only anomalous relative to other 09:31 bars. A minute
//! with no usable variance yields no score at all, so it can never gate.

use cache_store::Series;
use chrono::{NaiveDate, NaiveTime};
use scan_core::adaptive;
use std::collections::HashMap;

pub struct MinuteProfile {
    volumes: HashMap<NaiveTime, Vec<f64>>,
}

impl MinuteProfile {
    /// Build from the trailing `window_days` sessions strictly before `date`.
    pub fn build(series: &Series, date: NaiveDate, window_days: usize) -> Self {
        let sessions: Vec<NaiveDate> = series
            .session_dates()
            .into_iter()
            .filter(|d| *d < date)
            .collect();
        let start = sessions.len().saturating_sub(window_days);

        let mut volumes: HashMap<NaiveTime, Vec<f64>> = HashMap::new();
        for session in &sessions[start..] {
            for bar in series.day(*session) {
                volumes
                    .entry(bar.timestamp.time())
                    .or_default()
                    .push(bar.volume);
            }
        }
        Self { volumes }
    }

    /// Z-score of `volume` against the profile for `minute`. None when the
    /// minute was never observed or its distribution is ~flat.
    pub fn z_score(&self, minute: NaiveTime, volume: f64) -> Option<f64> {
        let history = self.volumes.get(&minute)?;
        adaptive::z_score(volume, history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use scan_core::Bar;

    fn bar(ts: &str, volume: f64) -> Bar {
        let timestamp = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap();
        Bar {
            timestamp,
            open: 10.0,
            high: 10.0,
            low: 10.0,
            close: 10.0,
            volume,
        }
    }

    fn series(bars: Vec<Bar>) -> Series {
        Series {
            bars,
            has_range: true,
            has_volume: true,
        }
    }

    #[test]
    fn test_z_score_against_same_minute_only() {
        let s = series(vec![
            bar("2025-08-25 09:30:00", 100.0),
            bar("2025-08-25 09:31:00", 900.0),
            bar("2025-08-26 09:30:00", 200.0),
            bar("2025-08-26 09:31:00", 1100.0),
        ]);
        let date = NaiveDate::from_ymd_opt(2025, 8, 27).unwrap();
        let profile = MinuteProfile::build(&s, date, 20);

        let t930 = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let z = profile.z_score(t930, 150.0).unwrap();
        // 150 is the mean of {100, 200}
        assert!(z.abs() < 1e-9);
    }

    #[test]
    fn test_flat_history_yields_none() {
        let s = series(vec![
            bar("2025-08-25 09:30:00", 500.0),
            bar("2025-08-26 09:30:00", 500.0),
        ]);
        let date = NaiveDate::from_ymd_opt(2025, 8, 27).unwrap();
        let profile = MinuteProfile::build(&s, date, 20);
        let t930 = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        assert!(profile.z_score(t930, 9999.0).is_none());
    }

    #[test]
    fn test_unseen_minute_yields_none() {
        let s = series(vec![bar("2025-08-25 09:30:00", 500.0)]);
        let date = NaiveDate::from_ymd_opt(2025, 8, 27).unwrap();
        let profile = MinuteProfile::build(&s, date, 20);
        let t945 = NaiveTime::from_hms_opt(9, 45, 0).unwrap();
        assert!(profile.z_score(t945, 100.0).is_none());
    }

    #[test]
    fn test_window_excludes_target_date() {
        let s = series(vec![
            bar("2025-08-25 09:30:00", 100.0),
            bar("2025-08-27 09:30:00", 100000.0),
        ]);
        let date = NaiveDate::from_ymd_opt(2025, 8, 27).unwrap();
        let profile = MinuteProfile::build(&s, date, 20);
        let t930 = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        // only one historical observation → no variance → no score
        assert!(profile.z_score(t930, 100.0).is_none());
    }
}
