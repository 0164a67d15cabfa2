//! `paxlane-recon` — Multi-source traffic reconciliation engine.
//!
//! Runs the per-month pipeline: overlap detection, confidence-based conflict
//! resolution, ratio calculation, mass spreading. The companion undo engine
//! reverses one day's external-source changes. All IO goes through the store
//! traits in `paxlane-store`.

pub mod cluster;
pub mod engine;
pub mod error;
pub mod overlap;
pub mod pool;
pub mod ratio;
pub mod report;
pub mod resolve;
pub mod spread;
pub mod undo;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::{run, FirstStep, RunOptions, DEFAULT_WORKERS};
pub use error::EngineError;
pub use report::{RunReport, UndoReport, UnplacedRecord};
pub use undo::undo;
