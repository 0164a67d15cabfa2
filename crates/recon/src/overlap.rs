use tracing::info;

use paxlane_core::{RecordId, YearMonth};
use paxlane_store::Stores;

use crate::error::EngineError;
use crate::pool::run_phase;
use crate::report::DetectStats;

/// Identify overlaps: for every record in scope, find every other record
/// whose scope could describe the same real-world traffic and link the two
/// bidirectionally.
///
/// Markers are sets, so re-running detection is idempotent. Matching runs
/// against a snapshot taken once at phase start; within one pass no
/// comparison depends on a concurrent marker write.
pub fn detect(
    stores: &Stores,
    ym: YearMonth,
    providers: &[String],
    workers: usize,
) -> Result<DetectStats, EngineError> {
    let snapshot = stores.records.for_month(ym, providers)?;
    info!(records = snapshot.len(), year_month = %ym, "identifying overlaps");

    let mut stats = DetectStats {
        records: snapshot.len(),
        ..DetectStats::default()
    };

    let snapshot = &snapshot;
    let phase = run_phase(
        "identify-overlaps",
        (0..snapshot.len()).collect(),
        workers,
        |i| {
            let source = &snapshot[i];
            let mut pairs: Vec<(RecordId, RecordId)> = Vec::new();
            for other in snapshot.iter() {
                if other.id == source.id {
                    continue;
                }
                if source.scope.overlaps(&other.scope) {
                    pairs.push((source.id, other.id));
                }
            }
            Ok(pairs)
        },
        |pairs| {
            for (a, b) in pairs {
                if stores.records.add_overlap(a, b)? {
                    stats.links_added += 1;
                }
                if stores.records.add_overlap(b, a)? {
                    stats.links_added += 1;
                }
            }
            Ok(())
        },
    )?;
    stats.skipped = phase.skipped;

    stats.overlapping = stores
        .records
        .for_month(ym, providers)?
        .iter()
        .filter(|r| !r.overlap.is_empty())
        .count();
    info!(
        links = stats.links_added,
        overlapping = stats.overlapping,
        "end identify overlaps"
    );
    Ok(stats)
}
