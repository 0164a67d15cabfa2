use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::Scope;
use crate::ym::YearMonth;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identity of an external record. Assigned in insertion order by the
/// record store; the equal-confidence tie-break leans on this ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Stable identity of a ground-truth segment row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// External records
// ---------------------------------------------------------------------------

/// Allocation ratio computed by the ratio phase.
///
/// `pax_ratio: None` is the sentinel for "no existing ground truth for this
/// scope" and routes the record to the creation path of the spreader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub pax_ratio: Option<f64>,
    pub rev_ratio: Option<f64>,
}

/// A single normalized observation reported by an external provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub id: RecordId,
    pub provider: String,
    pub data_type: String,
    pub scope: Scope,
    pub total_pax: u64,
    pub revenue: Option<f64>,
    /// Date of the ingestion batch that produced this record. Guards the
    /// update path against double application on re-runs.
    pub source_date: NaiveDate,
    pub overlap: BTreeSet<RecordId>,
    pub ratio: Option<Ratio>,
}

impl ExternalRecord {
    /// A record takes part in the ratio/spread phases only while its overlap
    /// marker is empty: it either never conflicted or won its conflict.
    pub fn is_surviving(&self) -> bool {
        self.overlap.is_empty()
    }
}

/// Insertion shape for an external record; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExternalRecord {
    pub provider: String,
    pub data_type: String,
    pub scope: Scope,
    pub total_pax: u64,
    pub revenue: Option<f64>,
    pub source_date: NaiveDate,
}

// ---------------------------------------------------------------------------
// Ground-truth segments
// ---------------------------------------------------------------------------

/// The pair of values an external-source update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentValues {
    pub passengers: u64,
    pub segment_revenue_usd: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    ExternalSource,
    Manual,
}

/// One change-history entry. Append-only, popped by the undo engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub on: DateTime<Utc>,
    pub source_date: NaiveDate,
    pub kind: UpdateKind,
    pub prior: SegmentValues,
    pub new: SegmentValues,
    pub provider: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationKind {
    /// Created verbatim from an atomic external record.
    ByRecord,
    /// Created by spreading an aggregate record across capacity shares.
    ByCapacity,
}

/// Provenance of a segment created by an external-source ingestion. Absent on
/// rows that came from the base schedule ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationStamp {
    pub provider: String,
    pub record: RecordId,
    pub on: DateTime<Utc>,
    pub kind: CreationKind,
}

/// One row of the canonical monthly route/airline traffic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub origin: String,
    pub destination: String,
    pub operating_airline: String,
    pub operating_airline_ref_code: String,
    pub year_month: YearMonth,
    pub cabin_class: String,
    pub segment_split: String,
    pub passengers: u64,
    pub segment_revenue_usd: Option<u64>,
    pub record_ok: bool,
    pub created: Option<CreationStamp>,
    pub updated: Vec<HistoryEntry>,
}

impl Segment {
    pub fn values(&self) -> SegmentValues {
        SegmentValues {
            passengers: self.passengers,
            segment_revenue_usd: self.segment_revenue_usd,
        }
    }

    /// Whether an update from the given ingestion batch has already been
    /// applied to this row.
    pub fn has_update_for(&self, source_date: NaiveDate) -> bool {
        self.updated.iter().any(|e| e.source_date == source_date)
    }
}

/// Insertion shape for a base ground-truth row (schedule ingest path, no
/// external-source provenance); the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseSegment {
    pub origin: String,
    pub destination: String,
    pub operating_airline: String,
    pub operating_airline_ref_code: String,
    pub year_month: YearMonth,
    pub cabin_class: String,
    pub segment_split: String,
    pub passengers: u64,
    pub segment_revenue_usd: Option<u64>,
    pub record_ok: bool,
}

/// Insertion shape for a segment; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSegment {
    pub origin: String,
    pub destination: String,
    pub operating_airline: String,
    pub operating_airline_ref_code: String,
    pub year_month: YearMonth,
    pub passengers: u64,
    pub segment_revenue_usd: Option<u64>,
    pub created: CreationStamp,
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// A registered external source and its trust weight.
///
/// The confidence only applies to months at or after `ym_start`; before that
/// the provider has no defined confidence at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub confidence: i64,
    pub ym_start: YearMonth,
    pub import_process: bool,
}

/// Confidence snapshot for one target month, built once per run and passed
/// into conflict resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceTable {
    by_provider: HashMap<String, i64>,
}

impl ConfidenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: impl Into<String>, confidence: i64) {
        self.by_provider.insert(provider.into(), confidence);
    }

    pub fn get(&self, provider: &str) -> Option<i64> {
        self.by_provider.get(provider).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_provider.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

/// Scheduled seat capacity for one route/airline/month. Read-only input used
/// as the allocation weight when spreading aggregate records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityRecord {
    pub origin: String,
    pub destination: String,
    pub operating_airline: String,
    pub operating_airline_ref_code: String,
    pub year_month: YearMonth,
    pub capacity: u64,
    pub active: bool,
}
