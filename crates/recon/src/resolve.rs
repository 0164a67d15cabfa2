use std::collections::HashMap;

use tracing::{info, warn};

use paxlane_core::{ExternalRecord, RecordId, YearMonth};
use paxlane_store::Stores;

use crate::cluster::UnionFind;
use crate::error::EngineError;
use crate::report::ResolveStats;

/// Resolve overlap clusters: in each cluster the most trusted records keep
/// their data in play (their overlap marker is cleared); everyone else stays
/// marked and is excluded from the ratio and spread phases.
///
/// Confidence comes from a snapshot of the provider registry filtered to the
/// target month, so a provider reporting before its `ym_start` has no
/// confidence at all. Tie-break in a pairwise overlap: the record with the
/// lower stable id survives.
pub fn resolve(
    stores: &Stores,
    ym: YearMonth,
    providers: &[String],
) -> Result<ResolveStats, EngineError> {
    let confidence = stores.providers.confidence_as_of(ym)?;
    let snapshot = stores.records.for_month(ym, providers)?;
    let by_id: HashMap<RecordId, &ExternalRecord> =
        snapshot.iter().map(|r| (r.id, r)).collect();

    // Fold the overlap adjacency into a union-find once; cluster membership
    // becomes a single traversal instead of repeated store re-queries.
    let mut uf = UnionFind::new();
    for rec in &snapshot {
        if rec.overlap.is_empty() {
            continue;
        }
        uf.add(rec.id);
        for other in &rec.overlap {
            if by_id.contains_key(other) {
                uf.union(rec.id, *other);
            }
        }
    }

    let mut stats = ResolveStats::default();
    for members in uf.clusters() {
        if members.len() < 2 {
            continue;
        }
        stats.clusters += 1;

        let ranked: Vec<(RecordId, Option<i64>)> = members
            .iter()
            .map(|id| (*id, confidence.get(&by_id[id].provider)))
            .collect();

        if ranked.iter().all(|(_, c)| c.is_none()) {
            warn!(
                cluster = ?members,
                year_month = %ym,
                "no confidence data for any cluster member; leaving unresolved"
            );
            stats.unresolved += 1;
            continue;
        }

        let survivors: Vec<RecordId> = if ranked.len() == 2 {
            // Pairwise: exactly one survivor. Members are sorted by id, so on
            // an exact confidence tie the earlier record wins.
            let (a, conf_a) = ranked[0];
            let (b, conf_b) = ranked[1];
            if conf_b.unwrap_or(i64::MIN) > conf_a.unwrap_or(i64::MIN) {
                vec![b]
            } else {
                vec![a]
            }
        } else {
            // Larger clusters: every record not strictly dominated survives.
            let Some(top) = ranked.iter().filter_map(|(_, c)| *c).max() else {
                continue;
            };
            ranked
                .iter()
                .filter(|(_, c)| *c == Some(top))
                .map(|(id, _)| *id)
                .collect()
        };

        for id in &survivors {
            stores.records.clear_overlap(*id)?;
        }
        stats.survivors += survivors.len();
        stats.suppressed += members.len() - survivors.len();
    }

    info!(
        clusters = stats.clusters,
        survivors = stats.survivors,
        suppressed = stats.suppressed,
        unresolved = stats.unresolved,
        "end treatment of overlaps"
    );
    Ok(stats)
}
