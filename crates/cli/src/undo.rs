//! `paxlane undo` — reverse one day's external-source changes.

use std::path::Path;

use chrono::NaiveDate;

use paxlane_core::YearMonth;

use crate::reconcile::{engine_err, open_stores};
use crate::{store_err, usage_err, CliError};

pub fn cmd_undo(db: &Path, year_month: &str, date: &str, json: bool) -> Result<(), CliError> {
    let year_month: YearMonth = year_month.parse().map_err(|_| {
        usage_err(format!("invalid year-month '{year_month}' (expected YYYY-MM)"))
    })?;
    let day = NaiveDate::parse_from_str(date, "%Y/%m/%d")
        .map_err(|_| usage_err(format!("invalid date '{date}' (expected YYYY/MM/DD)")))?;

    let stores = open_stores(db)?;
    let report = paxlane_recon::undo(&stores, year_month, day).map_err(engine_err)?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| store_err(format!("JSON serialization error: {e}")))?;
        println!("{out}");
    }

    eprintln!(
        "undo {year_month} ({day}): {} segment(s) reverted ({} history entr{} popped), {} removed",
        report.reverted,
        report.entries_popped,
        if report.entries_popped == 1 { "y" } else { "ies" },
        report.removed,
    );
    Ok(())
}
