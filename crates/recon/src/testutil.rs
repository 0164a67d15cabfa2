//! Shared fixtures for the engine unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use paxlane_core::{
    BaseSegment, NewExternalRecord, Provider, Scope, ScopeValue, YearMonth,
};
use paxlane_store::{MemoryStore, Stores};

pub fn stores() -> Stores {
    Stores::from_memory(MemoryStore::new())
}

pub fn ym(s: &str) -> YearMonth {
    s.parse().unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// The ingestion batch date most fixtures use.
pub fn source_date() -> NaiveDate {
    day(2017, 8, 21)
}

/// Scope naming exactly one origin/destination/airline/month.
pub fn atomic_scope(origin: &str, destination: &str, airline: &str, m: &str) -> Scope {
    Scope {
        origin: ScopeValue::single(origin),
        destination: ScopeValue::single(destination),
        airline: ScopeValue::single(airline),
        airline_ref_code: ScopeValue::single(format!("{airline}R")),
        months: [ym(m)].into(),
        both_ways: false,
    }
}

/// Airport-pair scope with wildcard airline.
pub fn pair_scope(origin: &str, destination: &str, m: &str) -> Scope {
    Scope {
        origin: ScopeValue::single(origin),
        destination: ScopeValue::single(destination),
        airline: ScopeValue::Wildcard,
        airline_ref_code: ScopeValue::Wildcard,
        months: [ym(m)].into(),
        both_ways: false,
    }
}

pub fn record(provider: &str, scope: Scope, total_pax: u64) -> NewExternalRecord {
    NewExternalRecord {
        provider: provider.into(),
        data_type: "airport_pair".into(),
        scope,
        total_pax,
        revenue: None,
        source_date: source_date(),
    }
}

pub fn provider(name: &str, confidence: i64) -> Provider {
    Provider {
        name: name.into(),
        confidence,
        ym_start: ym("1990-01"),
        import_process: true,
    }
}

pub fn base_segment(
    origin: &str,
    destination: &str,
    airline: &str,
    m: &str,
    passengers: u64,
    revenue: Option<u64>,
) -> BaseSegment {
    BaseSegment {
        origin: origin.into(),
        destination: destination.into(),
        operating_airline: airline.into(),
        operating_airline_ref_code: format!("{airline}R"),
        year_month: ym(m),
        cabin_class: "EC".into(),
        segment_split: "Local".into(),
        passengers,
        segment_revenue_usd: revenue,
        record_ok: true,
    }
}
