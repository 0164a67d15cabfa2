use tracing::info;

use paxlane_core::{Ratio, RecordId, YearMonth};
use paxlane_store::Stores;

use crate::error::EngineError;
use crate::pool::run_phase;
use crate::report::RatioStats;

/// For every surviving record, compare its reported totals to the current
/// ground-truth sums for the same scope and store the resulting ratio on the
/// record. Segments are never touched here.
///
/// A zero or empty passenger sum yields the sentinel ratio (`pax_ratio:
/// None`), routing the record to the creation path of the spreader. The
/// revenue ratio only exists when the record reports non-zero revenue and
/// the matched revenue sum is non-zero.
pub fn calculate(
    stores: &Stores,
    ym: YearMonth,
    providers: &[String],
    workers: usize,
) -> Result<RatioStats, EngineError> {
    let surviving: Vec<_> = stores
        .records
        .for_month(ym, providers)?
        .into_iter()
        .filter(|r| r.is_surviving())
        .collect();
    info!(records = surviving.len(), year_month = %ym, "calculating ratios");

    let mut stats = RatioStats::default();
    let phase = run_phase(
        "calculate-ratios",
        surviving,
        workers,
        |rec| {
            let segments = stores.segments.matching(&rec.scope)?;
            let sum_pax: u64 = segments.iter().map(|s| s.passengers).sum();
            let sum_rev: u64 = segments
                .iter()
                .map(|s| s.segment_revenue_usd.unwrap_or(0))
                .sum();

            let ratio = if segments.is_empty() || sum_pax == 0 {
                Ratio { pax_ratio: None, rev_ratio: None }
            } else {
                let rev_ratio = match rec.revenue {
                    Some(rev) if rev != 0.0 && sum_rev > 0 => Some(rev / sum_rev as f64),
                    _ => None,
                };
                Ratio {
                    pax_ratio: Some(rec.total_pax as f64 / sum_pax as f64),
                    rev_ratio,
                }
            };
            Ok(vec![(rec.id, ratio)])
        },
        |intents: Vec<(RecordId, Ratio)>| {
            for (id, ratio) in intents {
                if ratio.pax_ratio.is_none() {
                    stats.no_ground_truth += 1;
                }
                stores.records.set_ratio(id, ratio)?;
                stats.computed += 1;
            }
            Ok(())
        },
    )?;
    stats.skipped = phase.skipped;

    info!(
        computed = stats.computed,
        no_ground_truth = stats.no_ground_truth,
        "end calculate ratios"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{base_segment, pair_scope, record, stores, ym};

    fn usa() -> Vec<String> {
        vec!["USA".to_string()]
    }

    #[test]
    fn ratio_against_existing_ground_truth() {
        let stores = stores();
        stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 600, None))
            .unwrap();
        stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "AA", "2017-03", 400, None))
            .unwrap();
        let id = stores
            .records
            .insert(record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200))
            .unwrap();

        let stats = calculate(&stores, ym("2017-03"), &usa(), 4).unwrap();
        assert_eq!(stats.computed, 1);
        assert_eq!(stats.no_ground_truth, 0);

        let ratio = stores.records.record(id).unwrap().unwrap().ratio.unwrap();
        assert_eq!(ratio.pax_ratio, Some(1.2));
        assert_eq!(ratio.rev_ratio, None);
    }

    #[test]
    fn zero_sum_yields_the_sentinel() {
        let stores = stores();
        let id = stores
            .records
            .insert(record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200))
            .unwrap();

        let stats = calculate(&stores, ym("2017-03"), &usa(), 4).unwrap();
        assert_eq!(stats.no_ground_truth, 1);

        let ratio = stores.records.record(id).unwrap().unwrap().ratio.unwrap();
        assert_eq!(ratio.pax_ratio, None);
    }

    #[test]
    fn revenue_ratio_needs_both_sides_nonzero() {
        let stores = stores();
        stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 1000, Some(50_000)))
            .unwrap();
        let mut with_rev = record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200);
        with_rev.revenue = Some(75_000.0);
        let id = stores.records.insert(with_rev).unwrap();

        calculate(&stores, ym("2017-03"), &usa(), 4).unwrap();
        let ratio = stores.records.record(id).unwrap().unwrap().ratio.unwrap();
        assert_eq!(ratio.pax_ratio, Some(1.2));
        assert_eq!(ratio.rev_ratio, Some(1.5));
    }

    #[test]
    fn revenue_ratio_absent_when_ground_truth_has_none() {
        let stores = stores();
        stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 1000, None))
            .unwrap();
        let mut with_rev = record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200);
        with_rev.revenue = Some(75_000.0);
        let id = stores.records.insert(with_rev).unwrap();

        calculate(&stores, ym("2017-03"), &usa(), 4).unwrap();
        let ratio = stores.records.record(id).unwrap().unwrap().ratio.unwrap();
        assert_eq!(ratio.pax_ratio, Some(1.2));
        assert_eq!(ratio.rev_ratio, None);
    }

    #[test]
    fn suppressed_records_are_left_alone() {
        let stores = stores();
        stores
            .segments
            .insert_base(base_segment("JFK", "LAX", "DL", "2017-03", 1000, None))
            .unwrap();
        let id = stores
            .records
            .insert(record("USA", pair_scope("JFK", "LAX", "2017-03"), 1200))
            .unwrap();
        stores.records.add_overlap(id, paxlane_core::RecordId(77)).unwrap();

        let stats = calculate(&stores, ym("2017-03"), &usa(), 4).unwrap();
        assert_eq!(stats.computed, 0);
        assert!(stores.records.record(id).unwrap().unwrap().ratio.is_none());
    }
}
