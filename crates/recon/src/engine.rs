use chrono::Utc;
use tracing::{info, warn};

use paxlane_core::YearMonth;
use paxlane_store::Stores;

use crate::error::EngineError;
use crate::report::RunReport;
use crate::{overlap, ratio, resolve, spread};

/// Default size of the per-phase worker pool.
pub const DEFAULT_WORKERS: usize = 20;

/// Where a reconcile run starts. Later steps assume the earlier ones already
/// ran for this month; re-entry is safe because each phase is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FirstStep {
    /// Detect and resolve overlaps, then ratios, then spreading.
    Detect,
    /// Skip detection and resolution; start at ratio calculation.
    Ratios,
    /// Only spread (ratios already computed).
    Spread,
}

impl FirstStep {
    pub fn from_step(step: u8) -> Option<Self> {
        match step {
            1 => Some(Self::Detect),
            2 => Some(Self::Ratios),
            3 => Some(Self::Spread),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub year_month: YearMonth,
    pub first_step: FirstStep,
    pub reset_overlap: bool,
    pub workers: usize,
}

impl RunOptions {
    pub fn new(year_month: YearMonth) -> Self {
        Self {
            year_month,
            first_step: FirstStep::Detect,
            reset_overlap: false,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Run the reconcile pipeline for one month across the providers flagged for
/// the import process. Phases never overlap: each drains before the next
/// starts.
pub fn run(stores: &Stores, options: &RunOptions) -> Result<RunReport, EngineError> {
    if options.workers == 0 {
        return Err(EngineError::InvalidOptions("workers must be at least 1".into()));
    }
    let ym = options.year_month;
    let providers = stores.providers.import_enabled()?;
    let mut report = RunReport::new(ym, providers.clone());
    if providers.is_empty() {
        warn!(year_month = %ym, "no providers flagged for the import process");
        return Ok(report);
    }
    info!(
        year_month = %ym,
        providers = providers.len(),
        "treating external sources"
    );

    if options.first_step <= FirstStep::Detect {
        if options.reset_overlap {
            let reset = stores.records.reset_overlaps(ym, &providers)?;
            info!(reset, "overlap markers reset");
            report.overlap_reset = Some(reset);
        }
        report.detect = Some(overlap::detect(stores, ym, &providers, options.workers)?);
        report.resolve = Some(resolve::resolve(stores, ym, &providers)?);
    }

    if options.first_step <= FirstStep::Ratios {
        report.ratio = Some(ratio::calculate(stores, ym, &providers, options.workers)?);
    }

    let (spread_stats, not_placed) =
        spread::spread(stores, ym, &providers, options.workers, Utc::now())?;
    report.spread = spread_stats;
    report.not_placed = not_placed;

    if !report.not_placed.is_empty() {
        warn!(
            count = report.not_placed.len(),
            "records were not placed and need operator review"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_numbers_map_to_phases() {
        assert_eq!(FirstStep::from_step(1), Some(FirstStep::Detect));
        assert_eq!(FirstStep::from_step(2), Some(FirstStep::Ratios));
        assert_eq!(FirstStep::from_step(3), Some(FirstStep::Spread));
        assert_eq!(FirstStep::from_step(0), None);
        assert_eq!(FirstStep::from_step(4), None);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let stores = crate::testutil::stores();
        let mut options = RunOptions::new(crate::testutil::ym("2017-03"));
        options.workers = 0;
        assert!(matches!(
            run(&stores, &options),
            Err(EngineError::InvalidOptions(_))
        ));
    }

    #[test]
    fn empty_provider_table_yields_an_empty_report() {
        let stores = crate::testutil::stores();
        let report = run(&stores, &RunOptions::new(crate::testutil::ym("2017-03"))).unwrap();
        assert!(report.providers.is_empty());
        assert!(report.detect.is_none());
    }
}
