use chrono::NaiveDate;
use tracing::info;

use paxlane_core::{UpdateKind, YearMonth};
use paxlane_store::{SegmentWrite, Stores};

use crate::error::EngineError;
use crate::report::UndoReport;

/// Reverse one calendar day's external-source changes for a month.
///
/// Trailing history entries of the external-source kind stamped on `day` are
/// popped, restoring the values from just before them; entries from other
/// days or of other kinds stop the walk and stay untouched. Segments an
/// external-source ingestion created that day and never touched again are
/// removed outright.
pub fn undo(stores: &Stores, ym: YearMonth, day: NaiveDate) -> Result<UndoReport, EngineError> {
    info!(year_month = %ym, %day, "undoing external-source changes");
    let mut report = UndoReport::default();

    let mut reverts: Vec<SegmentWrite> = Vec::new();
    for seg in stores.segments.updated_on(ym, day)? {
        let mut pop = 0;
        let mut restore = None;
        for entry in seg.updated.iter().rev() {
            if entry.kind != UpdateKind::ExternalSource || entry.on.date_naive() != day {
                break;
            }
            pop += 1;
            restore = Some(entry.prior);
        }
        if let Some(restore) = restore {
            reverts.push(SegmentWrite::Revert { id: seg.id, restore, pop });
            report.reverted += 1;
            report.entries_popped += pop;
        }
    }
    stores.segments.apply(reverts)?;

    // After the pops: rows created that day whose history is now empty were
    // only ever touched by that ingestion, so they go away entirely.
    let removals: Vec<SegmentWrite> = stores
        .segments
        .created_on(ym, day)?
        .into_iter()
        .map(|seg| SegmentWrite::Remove(seg.id))
        .collect();
    report.removed = removals.len();
    stores.segments.apply(removals)?;

    info!(
        reverted = report.reverted,
        entries_popped = report.entries_popped,
        removed = report.removed,
        "end undo"
    );
    Ok(report)
}
