//! `paxlane reconcile` — run the per-month reconciliation pipeline.

use std::path::Path;

use paxlane_core::YearMonth;
use paxlane_recon::{run, EngineError, FirstStep, RunOptions};
use paxlane_store::{SqliteStore, Stores};

use crate::{store_err, usage_err, CliError};

pub fn cmd_reconcile(
    db: &Path,
    year_month: &str,
    first_step: u8,
    reset_overlap: bool,
    workers: usize,
    json: bool,
) -> Result<(), CliError> {
    let year_month: YearMonth = year_month.parse().map_err(|_| {
        usage_err(format!("invalid year-month '{year_month}' (expected YYYY-MM)"))
    })?;
    let first_step = FirstStep::from_step(first_step)
        .ok_or_else(|| usage_err("--first-step must be 1, 2 or 3"))?;

    let stores = open_stores(db)?;
    let mut options = RunOptions::new(year_month);
    options.first_step = first_step;
    options.reset_overlap = reset_overlap;
    options.workers = workers;

    let report = run(&stores, &options).map_err(engine_err)?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| store_err(format!("JSON serialization error: {e}")))?;
        println!("{out}");
    }

    // Human summary to stderr
    if let Some(reset) = report.overlap_reset {
        eprintln!("overlap markers reset: {reset}");
    }
    if let Some(d) = &report.detect {
        eprintln!(
            "overlaps: {} record(s) examined, {} link(s) added, {} overlapping",
            d.records, d.links_added, d.overlapping,
        );
    }
    if let Some(r) = &report.resolve {
        eprintln!(
            "conflicts: {} cluster(s) — {} survivor(s), {} suppressed, {} unresolved",
            r.clusters, r.survivors, r.suppressed, r.unresolved,
        );
    }
    if let Some(r) = &report.ratio {
        eprintln!(
            "ratios: {} computed, {} without ground truth",
            r.computed, r.no_ground_truth,
        );
    }
    eprintln!(
        "spread: {} segment(s) updated, {} created, {} already applied",
        report.spread.updated, report.spread.created, report.spread.already_applied,
    );

    if !report.not_placed.is_empty() {
        eprintln!(
            "{} record(s) could not be placed (no segments, no capacity):",
            report.not_placed.len(),
        );
        for unplaced in &report.not_placed {
            eprintln!(
                "  {} {} '{}' ({} pax)",
                unplaced.id, unplaced.provider, unplaced.data_type, unplaced.total_pax,
            );
        }
    }
    Ok(())
}

pub(crate) fn open_stores(db: &Path) -> Result<Stores, CliError> {
    let store = SqliteStore::open(db)
        .map_err(|e| store_err(format!("cannot open {}: {e}", db.display())))?;
    Ok(Stores::from_sqlite(store))
}

pub(crate) fn engine_err(err: EngineError) -> CliError {
    match err {
        EngineError::InvalidOptions(msg) => usage_err(msg),
        other => store_err(other.to_string()),
    }
}
