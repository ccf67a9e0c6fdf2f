//! Regime-conditioned transition priors.
//!
//! An offline batch job learns decile edges and empirical transition rates
//! from a daily corpus; at scoring time the table is read-only and the
//! lookup is total: an unseen regime falls back to a coarser match, then to
//! the corpus-wide mean, and never fails.

pub mod build;
pub mod edges;
pub mod key;
pub mod table;

pub use build::*;
pub use edges::*;
pub use key::*;
pub use table::*;
