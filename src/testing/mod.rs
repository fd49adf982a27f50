//! # Testing & Run Summaries
//!
//! Turns the event stream of a collection run into test outcomes:
//!
//! - [`assertion`]: one `assertion` event per test result reported by a script
//! - [`summary`]: per-category counters (total / pending / failed) and the
//!   ordered failure ledger reporters render

pub mod assertion;
pub mod summary;

pub use assertion::{AssertionEntry, AssertionSynthesizer};
pub use summary::{Category, Counter, FailureRecord, FailureSource, RunSummary, SummaryAggregator};
