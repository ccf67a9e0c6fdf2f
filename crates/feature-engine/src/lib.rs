//! Per-(ticker, date, cutoff) feature extraction.
//!
//! Works entirely from cached OHLCV tables. Finer resolutions are preferred
//! and coarser ones are always-available backups; a ticker that cannot be
//! featured is excluded with a typed reason, never an error.

pub mod engine;
pub mod profile;
pub mod row;

pub use engine::*;
pub use profile::*;
pub use row::*;
