//! `paxlane load` — seed the store with normalized data.
//!
//! The per-provider scrapers and spreadsheet parsers live outside this repo;
//! what they hand over is already schema-normalized. These commands are that
//! handover point: plain CSV for records, capacity and base segments, TOML
//! for the provider table.
//!
//! Multi-valued scope fields use `|` as separator and `*` for the wildcard,
//! e.g. `origin = "JFK|LGA"`, `airline = "*"`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Subcommand;
use serde::Deserialize;

use paxlane_core::{
    BaseSegment, CapacityRecord, NewExternalRecord, Provider, Scope, ScopeValue, YearMonth,
};
use paxlane_store::Stores;

use crate::exit_codes::EXIT_LOAD_PARSE;
use crate::reconcile::open_stores;
use crate::{store_err, CliError};

#[derive(Subcommand)]
pub enum LoadCommands {
    /// Load normalized external records from CSV
    Records { file: PathBuf },
    /// Load the provider table from TOML
    Providers { file: PathBuf },
    /// Load capacity rows from CSV
    Capacity { file: PathBuf },
    /// Load base ground-truth segments from CSV
    Segments { file: PathBuf },
}

pub fn cmd_load(db: &Path, command: LoadCommands) -> Result<(), CliError> {
    let stores = open_stores(db)?;
    let (file, what, loaded) = match command {
        LoadCommands::Records { file } => {
            let data = read_file(&file)?;
            let n = load_records(&stores, &data).map_err(|e| with_file(&file, e))?;
            (file, "external record(s)", n)
        }
        LoadCommands::Providers { file } => {
            let data = read_file(&file)?;
            let n = load_providers(&stores, &data).map_err(|e| with_file(&file, e))?;
            (file, "provider(s)", n)
        }
        LoadCommands::Capacity { file } => {
            let data = read_file(&file)?;
            let n = load_capacity(&stores, &data).map_err(|e| with_file(&file, e))?;
            (file, "capacity row(s)", n)
        }
        LoadCommands::Segments { file } => {
            let data = read_file(&file)?;
            let n = load_segments(&stores, &data).map_err(|e| with_file(&file, e))?;
            (file, "segment(s)", n)
        }
    };
    eprintln!("loaded {loaded} {what} from {}", file.display());
    Ok(())
}

fn read_file(file: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(file)
        .map_err(|e| store_err(format!("cannot read {}: {e}", file.display())))
}

fn with_file(file: &Path, mut err: CliError) -> CliError {
    err.message = format!("{}: {}", file.display(), err.message);
    err
}

fn parse_error(message: impl Into<String>) -> CliError {
    CliError { code: EXIT_LOAD_PARSE, message: message.into(), hint: None }
}

// ---------------------------------------------------------------------------
// External records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RecordRow {
    provider: String,
    data_type: String,
    origin: String,
    destination: String,
    airline: String,
    airline_ref_code: String,
    year_months: String,
    both_ways: bool,
    total_pax: u64,
    revenue: Option<f64>,
    source_date: String,
}

fn scope_value(raw: &str) -> Result<ScopeValue, String> {
    if raw.trim() == "*" {
        return Ok(ScopeValue::Wildcard);
    }
    let codes: Vec<&str> = raw
        .split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if codes.is_empty() {
        return Err(format!("empty scope value '{raw}'"));
    }
    Ok(ScopeValue::of(codes))
}

impl RecordRow {
    fn into_record(self) -> Result<NewExternalRecord, String> {
        let months = self
            .year_months
            .split('|')
            .map(|m| m.trim().parse::<YearMonth>().map_err(|e| e.to_string()))
            .collect::<Result<_, _>>()?;
        let source_date = NaiveDate::parse_from_str(&self.source_date, "%Y-%m-%d")
            .map_err(|_| format!("invalid source_date '{}'", self.source_date))?;
        Ok(NewExternalRecord {
            provider: self.provider,
            data_type: self.data_type,
            scope: Scope {
                origin: scope_value(&self.origin)?,
                destination: scope_value(&self.destination)?,
                airline: scope_value(&self.airline)?,
                airline_ref_code: scope_value(&self.airline_ref_code)?,
                months,
                both_ways: self.both_ways,
            },
            total_pax: self.total_pax,
            revenue: self.revenue,
            source_date,
        })
    }
}

pub fn load_records(stores: &Stores, csv_data: &str) -> Result<usize, CliError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());
    let mut loaded = 0;
    for (i, row) in reader.deserialize::<RecordRow>().enumerate() {
        let line = i + 2;
        let row = row.map_err(|e| parse_error(format!("line {line}: {e}")))?;
        let record = row
            .into_record()
            .map_err(|e| parse_error(format!("line {line}: {e}")))?;
        stores
            .records
            .insert(record)
            .map_err(|e| store_err(e.to_string()))?;
        loaded += 1;
    }
    Ok(loaded)
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProviderFile {
    #[serde(default)]
    provider: Vec<ProviderRow>,
}

#[derive(Debug, Deserialize)]
struct ProviderRow {
    name: String,
    confidence: i64,
    ym_start: YearMonth,
    import_process: bool,
}

pub fn load_providers(stores: &Stores, toml_data: &str) -> Result<usize, CliError> {
    let file: ProviderFile =
        toml::from_str(toml_data).map_err(|e| parse_error(e.to_string()))?;
    let loaded = file.provider.len();
    for row in file.provider {
        stores
            .providers
            .upsert(Provider {
                name: row.name,
                confidence: row.confidence,
                ym_start: row.ym_start,
                import_process: row.import_process,
            })
            .map_err(|e| store_err(e.to_string()))?;
    }
    Ok(loaded)
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CapacityRow {
    origin: String,
    destination: String,
    airline: String,
    airline_ref_code: String,
    year_month: YearMonth,
    capacity: u64,
    active: bool,
}

pub fn load_capacity(stores: &Stores, csv_data: &str) -> Result<usize, CliError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());
    let mut loaded = 0;
    for (i, row) in reader.deserialize::<CapacityRow>().enumerate() {
        let line = i + 2;
        let row = row.map_err(|e| parse_error(format!("line {line}: {e}")))?;
        stores
            .capacity
            .load(CapacityRecord {
                origin: row.origin,
                destination: row.destination,
                operating_airline: row.airline,
                operating_airline_ref_code: row.airline_ref_code,
                year_month: row.year_month,
                capacity: row.capacity,
                active: row.active,
            })
            .map_err(|e| store_err(e.to_string()))?;
        loaded += 1;
    }
    Ok(loaded)
}

// ---------------------------------------------------------------------------
// Base segments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SegmentRow {
    origin: String,
    destination: String,
    airline: String,
    airline_ref_code: String,
    year_month: YearMonth,
    passengers: u64,
    revenue: Option<u64>,
    record_ok: bool,
}

pub fn load_segments(stores: &Stores, csv_data: &str) -> Result<usize, CliError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(csv_data.as_bytes());
    let mut loaded = 0;
    for (i, row) in reader.deserialize::<SegmentRow>().enumerate() {
        let line = i + 2;
        let row = row.map_err(|e| parse_error(format!("line {line}: {e}")))?;
        stores
            .segments
            .insert_base(BaseSegment {
                origin: row.origin,
                destination: row.destination,
                operating_airline: row.airline,
                operating_airline_ref_code: row.airline_ref_code,
                year_month: row.year_month,
                cabin_class: "EC".into(),
                segment_split: "Local".into(),
                passengers: row.passengers,
                segment_revenue_usd: row.revenue,
                record_ok: row.record_ok,
            })
            .map_err(|e| store_err(e.to_string()))?;
        loaded += 1;
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paxlane_store::MemoryStore;

    fn stores() -> Stores {
        Stores::from_memory(MemoryStore::new())
    }

    #[test]
    fn records_csv_roundtrip() {
        let csv = "\
provider,data_type,origin,destination,airline,airline_ref_code,year_months,both_ways,total_pax,revenue,source_date
USA,airport_pair,JFK|LGA,MEX,*,*,2017-03,false,1200,96000.0,2017-08-21
Mexico,country,*,CUN,AM,AMX,2017-03|2017-04,true,5000,,2017-08-21
";
        let stores = stores();
        assert_eq!(load_records(&stores, csv).unwrap(), 2);

        let records = stores
            .records
            .for_month("2017-03".parse().unwrap(), &["USA".into(), "Mexico".into()])
            .unwrap();
        assert_eq!(records.len(), 2);

        let usa = records.iter().find(|r| r.provider == "USA").unwrap();
        assert_eq!(usa.scope.origin, ScopeValue::of(["JFK", "LGA"]));
        assert!(usa.scope.airline.is_wildcard());
        assert_eq!(usa.revenue, Some(96000.0));
        assert!(!usa.scope.both_ways);

        let mexico = records.iter().find(|r| r.provider == "Mexico").unwrap();
        assert!(mexico.scope.origin.is_wildcard());
        assert_eq!(mexico.scope.months.len(), 2);
        assert_eq!(mexico.revenue, None);
        assert!(mexico.scope.both_ways);
    }

    #[test]
    fn records_csv_rejects_bad_month() {
        let csv = "\
provider,data_type,origin,destination,airline,airline_ref_code,year_months,both_ways,total_pax,revenue,source_date
USA,airport_pair,JFK,MEX,*,*,2017-13,false,1200,,2017-08-21
";
        let err = load_records(&stores(), csv).unwrap_err();
        assert_eq!(err.code, EXIT_LOAD_PARSE);
        assert!(err.message.contains("line 2"));
    }

    #[test]
    fn providers_toml_roundtrip() {
        let toml_data = r#"
[[provider]]
name = "USA"
confidence = 40
ym_start = "1990-01"
import_process = true

[[provider]]
name = "UK"
confidence = 25
ym_start = "1983-01"
import_process = false
"#;
        let stores = stores();
        assert_eq!(load_providers(&stores, toml_data).unwrap(), 2);
        assert_eq!(stores.providers.import_enabled().unwrap(), vec!["USA".to_string()]);
        let table = stores
            .providers
            .confidence_as_of("2017-03".parse().unwrap())
            .unwrap();
        assert_eq!(table.get("UK"), Some(25));
    }

    #[test]
    fn capacity_and_segments_csv() {
        let capacity_csv = "\
origin,destination,airline,airline_ref_code,year_month,capacity,active
JFK,SEA,AS,ASA,2017-03,100,true
JFK,SEA,DL,DAL,2017-03,200,true
";
        let segments_csv = "\
origin,destination,airline,airline_ref_code,year_month,passengers,revenue,record_ok
JFK,MEX,DL,DAL,2017-03,600,48000,true
JFK,MEX,AM,AMX,2017-03,400,,true
";
        let stores = stores();
        assert_eq!(load_capacity(&stores, capacity_csv).unwrap(), 2);
        assert_eq!(load_segments(&stores, segments_csv).unwrap(), 2);

        let scope = Scope {
            origin: ScopeValue::single("JFK"),
            destination: ScopeValue::single("MEX"),
            airline: ScopeValue::Wildcard,
            airline_ref_code: ScopeValue::Wildcard,
            months: ["2017-03".parse().unwrap()].into(),
            both_ways: false,
        };
        let segments = stores.segments.matching(&scope).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments.iter().map(|s| s.passengers).sum::<u64>(),
            1000
        );
    }
}
