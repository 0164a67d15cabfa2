//! `paxlane-core` — Domain types for traffic reconciliation.
//!
//! Pure types crate: year-months, observation scopes, external records,
//! ground-truth segments. No IO dependencies.

pub mod model;
pub mod scope;
pub mod ym;

pub use model::{
    BaseSegment, CapacityRecord, ConfidenceTable, CreationKind, CreationStamp, ExternalRecord,
    HistoryEntry, NewExternalRecord, NewSegment, Provider, Ratio, RecordId, Segment, SegmentId,
    SegmentValues, UpdateKind,
};
pub use scope::{AtomicScope, Scope, ScopeValue};
pub use ym::YearMonth;
