//! Read-only access to cached OHLCV tables and per-cutoff snapshot
//! artifacts. Everything downstream of this crate works on in-memory bars;
//! nothing here fetches data.

pub mod atomic;
pub mod ohlcv;
pub mod snapshot;

pub use atomic::*;
pub use ohlcv::*;
pub use snapshot::*;
