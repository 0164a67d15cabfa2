use serde::Serialize;

use paxlane_core::{RecordId, Scope, YearMonth};

// ---------------------------------------------------------------------------
// Per-phase statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectStats {
    /// Records examined for the target month.
    pub records: usize,
    /// Overlap markers newly written (both directions counted).
    pub links_added: usize,
    /// Records left carrying at least one overlap marker.
    pub overlapping: usize,
    /// Records whose detection failed and was skipped.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveStats {
    pub clusters: usize,
    pub survivors: usize,
    pub suppressed: usize,
    /// Clusters with no confidence data at all, left untouched.
    pub unresolved: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RatioStats {
    /// Surviving records a ratio was computed for.
    pub computed: usize,
    /// Records with no matching ground truth (sentinel ratio, creation path).
    pub no_ground_truth: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SpreadStats {
    /// Segment rows updated in place.
    pub updated: usize,
    /// Segment rows newly created.
    pub created: usize,
    /// Rows left alone because this ingestion batch already touched them.
    pub already_applied: usize,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Run reports
// ---------------------------------------------------------------------------

/// A record that could not be placed: aggregate scope, no matching ground
/// truth, and no capacity to spread over. Surfaced for operator follow-up.
#[derive(Debug, Clone, Serialize)]
pub struct UnplacedRecord {
    pub id: RecordId,
    pub provider: String,
    pub data_type: String,
    pub scope: Scope,
    pub total_pax: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub year_month: YearMonth,
    pub providers: Vec<String>,
    pub overlap_reset: Option<usize>,
    pub detect: Option<DetectStats>,
    pub resolve: Option<ResolveStats>,
    pub ratio: Option<RatioStats>,
    pub spread: SpreadStats,
    pub not_placed: Vec<UnplacedRecord>,
}

impl RunReport {
    pub fn new(year_month: YearMonth, providers: Vec<String>) -> Self {
        Self {
            year_month,
            providers,
            overlap_reset: None,
            detect: None,
            resolve: None,
            ratio: None,
            spread: SpreadStats::default(),
            not_placed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UndoReport {
    /// Segments whose values were rolled back.
    pub reverted: usize,
    /// History entries popped across all reverted segments.
    pub entries_popped: usize,
    /// Created-then-untouched segments removed.
    pub removed: usize,
}
