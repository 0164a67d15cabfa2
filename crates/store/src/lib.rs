//! `paxlane-store` — Store contracts for the reconciliation engine.
//!
//! Each collaborator the engine consumes is a trait: external records,
//! providers, ground-truth segments, capacity. Two implementations ship:
//! [`MemoryStore`] (the working set, also used by tests) and [`SqliteStore`]
//! (durable, write-through).

use std::sync::Arc;

use chrono::NaiveDate;

use paxlane_core::{
    BaseSegment, CapacityRecord, ConfidenceTable, ExternalRecord, HistoryEntry, NewExternalRecord,
    NewSegment, Provider, Ratio, RecordId, Scope, Segment, SegmentId, SegmentValues, YearMonth,
};

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// ---------------------------------------------------------------------------
// Store contracts
// ---------------------------------------------------------------------------

pub trait ExternalRecords: Send + Sync {
    fn insert(&self, record: NewExternalRecord) -> StoreResult<RecordId>;

    fn record(&self, id: RecordId) -> StoreResult<Option<ExternalRecord>>;

    /// Every record whose scope covers `ym`, restricted to `providers`.
    fn for_month(&self, ym: YearMonth, providers: &[String]) -> StoreResult<Vec<ExternalRecord>>;

    /// Add `other` to the overlap marker of `id`. Set semantics: returns
    /// true only if the marker was newly added.
    fn add_overlap(&self, id: RecordId, other: RecordId) -> StoreResult<bool>;

    fn clear_overlap(&self, id: RecordId) -> StoreResult<()>;

    /// Remove every overlap marker in scope, for full re-detection. Returns
    /// how many records changed.
    fn reset_overlaps(&self, ym: YearMonth, providers: &[String]) -> StoreResult<usize>;

    fn set_ratio(&self, id: RecordId, ratio: Ratio) -> StoreResult<()>;
}

pub trait Providers: Send + Sync {
    fn upsert(&self, provider: Provider) -> StoreResult<()>;

    /// Names of the providers flagged for the import process.
    fn import_enabled(&self) -> StoreResult<Vec<String>>;

    /// Confidence snapshot for `ym`: providers whose `ym_start` is at or
    /// before the month. Providers outside their validity window are absent.
    fn confidence_as_of(&self, ym: YearMonth) -> StoreResult<ConfidenceTable>;
}

pub trait Segments: Send + Sync {
    fn segment(&self, id: SegmentId) -> StoreResult<Option<Segment>>;

    fn insert_base(&self, segment: BaseSegment) -> StoreResult<SegmentId>;

    /// The `record_ok` rows falling under the scope.
    fn matching(&self, scope: &Scope) -> StoreResult<Vec<Segment>>;

    /// Rows of the month carrying at least one history entry stamped on `day`.
    fn updated_on(&self, ym: YearMonth, day: NaiveDate) -> StoreResult<Vec<Segment>>;

    /// Rows of the month created by an external-source ingestion on `day`
    /// that carry no history (never subsequently touched).
    fn created_on(&self, ym: YearMonth, day: NaiveDate) -> StoreResult<Vec<Segment>>;

    /// Apply a batch of writes as one flush.
    fn apply(&self, batch: Vec<SegmentWrite>) -> StoreResult<()>;
}

pub trait Capacity: Send + Sync {
    fn load(&self, record: CapacityRecord) -> StoreResult<()>;

    /// Active, positive capacity under the scope, aggregated per
    /// (origin, destination, airline, reference code, month).
    fn aggregated(&self, scope: &Scope) -> StoreResult<Vec<CapacityBucket>>;
}

// ---------------------------------------------------------------------------
// Write batch
// ---------------------------------------------------------------------------

/// One mutation intent against the segment table. Workers emit these; the
/// phase consumer owns the batch and applies it.
#[derive(Debug, Clone)]
pub enum SegmentWrite {
    /// Ratio application: overwrite the traffic values and append history.
    Update {
        id: SegmentId,
        new: SegmentValues,
        entry: HistoryEntry,
    },
    /// Creation path: a brand-new row from an external record.
    Insert(NewSegment),
    /// Undo: pop the trailing `pop` history entries and restore values.
    Revert {
        id: SegmentId,
        restore: SegmentValues,
        pop: usize,
    },
    /// Undo: drop a row that an external-source ingestion created.
    Remove(SegmentId),
}

/// Aggregated capacity for one (route, airline, month) combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityBucket {
    pub origin: String,
    pub destination: String,
    pub operating_airline: String,
    pub operating_airline_ref_code: String,
    pub year_month: YearMonth,
    pub capacity: u64,
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The four store handles the engine runs against.
#[derive(Clone)]
pub struct Stores {
    pub records: Arc<dyn ExternalRecords>,
    pub providers: Arc<dyn Providers>,
    pub segments: Arc<dyn Segments>,
    pub capacity: Arc<dyn Capacity>,
}

impl Stores {
    pub fn from_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            records: store.clone(),
            providers: store.clone(),
            segments: store.clone(),
            capacity: store,
        }
    }

    pub fn from_sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            records: store.clone(),
            providers: store.clone(),
            segments: store.clone(),
            capacity: store,
        }
    }
}
