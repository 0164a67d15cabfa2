use chrono::{DateTime, Utc};
use tracing::{info, warn};

use paxlane_core::{
    CreationKind, CreationStamp, ExternalRecord, HistoryEntry, NewSegment, SegmentValues,
    UpdateKind, YearMonth,
};
use paxlane_store::{SegmentWrite, StoreError, Stores};

use crate::error::EngineError;
use crate::pool::run_phase;
use crate::report::{SpreadStats, UnplacedRecord};

/// Segment writes are queued and flushed together in batches of this size.
const WRITE_BATCH: usize = 1000;

enum SpreadIntent {
    Write(SegmentWrite),
    /// A matching segment already carries this ingestion batch's update.
    AlreadyApplied,
    NotPlaced(UnplacedRecord),
}

/// Round half up with a floor of one. Updated rows are never zeroed.
fn scale(value: u64, ratio: f64) -> u64 {
    let scaled = (value as f64 * ratio + 0.5).floor();
    (scaled as u64).max(1)
}

/// Route every surviving record into the update path (a ratio is known) or
/// the creation path (no ground truth existed), and apply the resulting
/// writes in batches.
///
/// Workers only read; the consumer owns the write batch. Records that fit
/// neither path are reported as not placed rather than silently dropped.
pub fn spread(
    stores: &Stores,
    ym: YearMonth,
    providers: &[String],
    workers: usize,
    now: DateTime<Utc>,
) -> Result<(SpreadStats, Vec<UnplacedRecord>), EngineError> {
    let surviving: Vec<ExternalRecord> = stores
        .records
        .for_month(ym, providers)?
        .into_iter()
        .filter(|r| r.is_surviving())
        .collect();
    info!(records = surviving.len(), year_month = %ym, "spreading mass");

    let mut stats = SpreadStats::default();
    let mut not_placed: Vec<UnplacedRecord> = Vec::new();
    let mut batch: Vec<SegmentWrite> = Vec::new();

    let phase = run_phase(
        "spread-mass",
        surviving,
        workers,
        |rec| match rec.ratio.as_ref().and_then(|r| r.pax_ratio) {
            Some(pax_ratio) => {
                let rev_ratio = rec.ratio.as_ref().and_then(|r| r.rev_ratio);
                update_intents(stores, &rec, pax_ratio, rev_ratio, now)
            }
            None => create_intents(stores, &rec, now),
        },
        |intents| {
            for intent in intents {
                match intent {
                    SpreadIntent::Write(write) => {
                        match &write {
                            SegmentWrite::Update { .. } => stats.updated += 1,
                            SegmentWrite::Insert(_) => stats.created += 1,
                            _ => {}
                        }
                        batch.push(write);
                        if batch.len() >= WRITE_BATCH {
                            stores.segments.apply(std::mem::take(&mut batch))?;
                        }
                    }
                    SpreadIntent::AlreadyApplied => stats.already_applied += 1,
                    SpreadIntent::NotPlaced(unplaced) => not_placed.push(unplaced),
                }
            }
            Ok(())
        },
    )?;
    stats.skipped = phase.skipped;

    if !batch.is_empty() {
        stores.segments.apply(batch)?;
    }

    for unplaced in &not_placed {
        warn!(
            record = %unplaced.id,
            provider = %unplaced.provider,
            total_pax = unplaced.total_pax,
            "not placed: aggregate scope with no matching segments and no capacity"
        );
    }
    info!(
        updated = stats.updated,
        created = stats.created,
        already_applied = stats.already_applied,
        not_placed = not_placed.len(),
        "end spread mass"
    );
    Ok((stats, not_placed))
}

/// Update path: apply the ratio to every segment under the record's scope.
/// The revenue ratio falls back to the passenger ratio when absent.
fn update_intents(
    stores: &Stores,
    rec: &ExternalRecord,
    pax_ratio: f64,
    rev_ratio: Option<f64>,
    now: DateTime<Utc>,
) -> Result<Vec<SpreadIntent>, StoreError> {
    let rev_ratio = rev_ratio.unwrap_or(pax_ratio);
    let mut out = Vec::new();
    for seg in stores.segments.matching(&rec.scope)? {
        if seg.has_update_for(rec.source_date) {
            out.push(SpreadIntent::AlreadyApplied);
            continue;
        }
        let prior = seg.values();
        let new = SegmentValues {
            passengers: scale(seg.passengers, pax_ratio),
            segment_revenue_usd: Some(scale(seg.segment_revenue_usd.unwrap_or(0), rev_ratio)),
        };
        out.push(SpreadIntent::Write(SegmentWrite::Update {
            id: seg.id,
            new,
            entry: HistoryEntry {
                on: now,
                source_date: rec.source_date,
                kind: UpdateKind::ExternalSource,
                prior,
                new,
                provider: rec.provider.clone(),
            },
        }));
    }
    Ok(out)
}

/// Creation path: atomic records become one segment verbatim; aggregate
/// records are split across active capacity shares. With no capacity the
/// record cannot be placed at this granularity.
fn create_intents(
    stores: &Stores,
    rec: &ExternalRecord,
    now: DateTime<Utc>,
) -> Result<Vec<SpreadIntent>, StoreError> {
    let stamp = |kind: CreationKind| CreationStamp {
        provider: rec.provider.clone(),
        record: rec.id,
        on: now,
        kind,
    };

    if let Some(atom) = rec.scope.as_atomic() {
        return Ok(vec![SpreadIntent::Write(SegmentWrite::Insert(NewSegment {
            origin: atom.origin.to_string(),
            destination: atom.destination.to_string(),
            operating_airline: atom.airline.to_string(),
            operating_airline_ref_code: atom.airline_ref_code.to_string(),
            year_month: atom.month,
            passengers: rec.total_pax,
            segment_revenue_usd: rec.revenue.map(|r| r.round() as u64),
            created: stamp(CreationKind::ByRecord),
        }))]);
    }

    let buckets = stores.capacity.aggregated(&rec.scope)?;
    if buckets.is_empty() {
        return Ok(vec![SpreadIntent::NotPlaced(UnplacedRecord {
            id: rec.id,
            provider: rec.provider.clone(),
            data_type: rec.data_type.clone(),
            scope: rec.scope.clone(),
            total_pax: rec.total_pax,
        })]);
    }

    let total: u64 = buckets.iter().map(|b| b.capacity).sum();
    let pax_share = rec.total_pax as f64 / total as f64;
    let rev_share = rec.revenue.filter(|r| *r != 0.0).map(|r| r / total as f64);

    // Plain floor here: a legitimately-zero allocation is meaningful, unlike
    // on the update path.
    Ok(buckets
        .into_iter()
        .map(|b| {
            SpreadIntent::Write(SegmentWrite::Insert(NewSegment {
                passengers: (pax_share * b.capacity as f64).floor() as u64,
                segment_revenue_usd: rev_share.map(|rs| (rs * b.capacity as f64).floor() as u64),
                origin: b.origin,
                destination: b.destination,
                operating_airline: b.operating_airline,
                operating_airline_ref_code: b.operating_airline_ref_code,
                year_month: b.year_month,
                created: stamp(CreationKind::ByCapacity),
            }))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{at, atomic_scope, base_segment, pair_scope, record, stores, ym};
    use paxlane_core::{CapacityRecord, Ratio, ScopeValue};
    use paxlane_store::Stores;

    fn usa() -> Vec<String> {
        vec!["USA".to_string()]
    }

    fn run_spread(stores: &Stores) -> (SpreadStats, Vec<UnplacedRecord>) {
        spread(stores, ym("2017-03"), &usa(), 4, at(2017, 8, 21, 12)).unwrap()
    }

    #[test]
    fn update_rounds_half_up_and_floors_at_one() {
        let stores = stores();
        let tiny = stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 10, None))
            .unwrap();
        let id = stores
            .records
            .insert(record("USA", pair_scope("JFK", "LAX", "2017-03"), 1))
            .unwrap();
        stores
            .records
            .set_ratio(id, Ratio { pax_ratio: Some(0.001), rev_ratio: None })
            .unwrap();

        let (stats, _) = run_spread(&stores);
        assert_eq!(stats.updated, 1);

        let seg = stores.segments.segment(tiny).unwrap().unwrap();
        assert_eq!(seg.passengers, 1);
        assert_eq!(seg.updated.len(), 1);
        assert_eq!(seg.updated[0].prior.passengers, 10);
        assert_eq!(seg.updated[0].provider, "USA");
    }

    #[test]
    fn update_applies_ratio_and_appends_history() {
        let stores = stores();
        let seg_id = stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 1000, Some(80_000)))
            .unwrap();
        let id = stores
            .records
            .insert(record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200))
            .unwrap();
        stores
            .records
            .set_ratio(id, Ratio { pax_ratio: Some(1.2), rev_ratio: None })
            .unwrap();

        run_spread(&stores);
        let seg = stores.segments.segment(seg_id).unwrap().unwrap();
        assert_eq!(seg.passengers, 1200);
        // Revenue ratio falls back to the passenger ratio.
        assert_eq!(seg.segment_revenue_usd, Some(96_000));
    }

    #[test]
    fn rerun_with_same_source_date_does_not_double_apply() {
        let stores = stores();
        let seg_id = stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 1000, None))
            .unwrap();
        let id = stores
            .records
            .insert(record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200))
            .unwrap();
        stores
            .records
            .set_ratio(id, Ratio { pax_ratio: Some(1.2), rev_ratio: None })
            .unwrap();

        let (first, _) = run_spread(&stores);
        let (second, _) = run_spread(&stores);
        assert_eq!(first.updated, 1);
        assert_eq!(second.updated, 0);
        assert_eq!(second.already_applied, 1);

        let seg = stores.segments.segment(seg_id).unwrap().unwrap();
        assert_eq!(seg.passengers, 1200);
        assert_eq!(seg.updated.len(), 1);
    }

    #[test]
    fn atomic_record_creates_one_segment_verbatim() {
        let stores = stores();
        let mut rec = record("USA", atomic_scope("ANC", "FAI", "AS", "2017-03"), 740);
        rec.revenue = Some(61_500.0);
        stores.records.insert(rec).unwrap();

        let (stats, not_placed) = run_spread(&stores);
        assert_eq!(stats.created, 1);
        assert!(not_placed.is_empty());

        let created = stores
            .segments
            .matching(&atomic_scope("ANC", "FAI", "AS", "2017-03"))
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].passengers, 740);
        assert_eq!(created[0].segment_revenue_usd, Some(61_500));
        assert!(created[0].created.is_some());
    }

    #[test]
    fn aggregate_record_spreads_across_capacity_shares() {
        let stores = stores();
        let cap = |airline: &str, capacity: u64| CapacityRecord {
            origin: "JFK".into(),
            destination: "MEX".into(),
            operating_airline: airline.into(),
            operating_airline_ref_code: format!("{airline}R"),
            year_month: ym("2017-03"),
            capacity,
            active: true,
        };
        stores.capacity.load(cap("AM", 100)).unwrap();
        stores.capacity.load(cap("DL", 200)).unwrap();
        stores
            .records
            .insert(record("USA", pair_scope("JFK", "MEX", "2017-03"), 300))
            .unwrap();

        let (stats, not_placed) = run_spread(&stores);
        assert_eq!(stats.created, 2);
        assert!(not_placed.is_empty());

        let created = stores
            .segments
            .matching(&pair_scope("JFK", "MEX", "2017-03"))
            .unwrap();
        let mut by_airline: Vec<(String, u64)> = created
            .iter()
            .map(|s| (s.operating_airline.clone(), s.passengers))
            .collect();
        by_airline.sort();
        assert_eq!(by_airline, vec![("AM".to_string(), 100), ("DL".to_string(), 200)]);
    }

    #[test]
    fn aggregate_record_without_capacity_is_reported_not_placed() {
        let stores = stores();
        let mut country_wide = pair_scope("JFK", "MEX", "2017-03");
        country_wide.origin = ScopeValue::Wildcard;
        let id = stores
            .records
            .insert(record("USA", country_wide, 5000))
            .unwrap();

        let (stats, not_placed) = run_spread(&stores);
        assert_eq!(stats.created, 0);
        assert_eq!(not_placed.len(), 1);
        assert_eq!(not_placed[0].id, id);
        assert_eq!(not_placed[0].total_pax, 5000);
    }

    #[test]
    fn suppressed_records_never_spread() {
        let stores = stores();
        stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 1000, None))
            .unwrap();
        let id = stores
            .records
            .insert(record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200))
            .unwrap();
        stores
            .records
            .set_ratio(id, Ratio { pax_ratio: Some(1.2), rev_ratio: None })
            .unwrap();
        stores.records.add_overlap(id, paxlane_core::RecordId(9)).unwrap();

        let (stats, _) = run_spread(&stores);
        assert_eq!(stats.updated, 0);
    }

    #[test]
    fn scale_semantics() {
        assert_eq!(scale(10, 0.001), 1);
        assert_eq!(scale(1000, 1.2), 1200);
        assert_eq!(scale(999, 1.0015), 1000);
        assert_eq!(scale(1, 0.4), 1);
        // Half rounds up.
        assert_eq!(scale(5, 0.5), 3);
    }
}
