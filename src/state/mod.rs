//! Persisted per-branch sync state.

pub mod baseline;

pub use baseline::{BaselineEntry, BaselineSnapshot, BaselineStore, FileBaselineStore};
