use std::path::Path;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use paxlane_core::{
    BaseSegment, CapacityRecord, ConfidenceTable, CreationStamp, ExternalRecord, HistoryEntry,
    NewExternalRecord, Provider, Ratio, RecordId, Scope, Segment, SegmentId, YearMonth,
};

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryStore;
use crate::{Capacity, CapacityBucket, ExternalRecords, Providers, SegmentWrite, Segments};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS providers (
    name            TEXT PRIMARY KEY,
    confidence      INTEGER NOT NULL,
    ym_start        TEXT NOT NULL,
    import_process  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS external_records (
    id           INTEGER PRIMARY KEY,
    provider     TEXT NOT NULL,
    data_type    TEXT NOT NULL,
    scope        TEXT NOT NULL,
    total_pax    INTEGER NOT NULL,
    revenue      REAL,
    source_date  TEXT NOT NULL,
    overlap      TEXT NOT NULL,
    ratio        TEXT
);
CREATE TABLE IF NOT EXISTS segments (
    id                          INTEGER PRIMARY KEY,
    origin                      TEXT NOT NULL,
    destination                 TEXT NOT NULL,
    operating_airline           TEXT NOT NULL,
    operating_airline_ref_code  TEXT NOT NULL,
    year_month                  TEXT NOT NULL,
    cabin_class                 TEXT NOT NULL,
    segment_split               TEXT NOT NULL,
    passengers                  INTEGER NOT NULL,
    segment_revenue_usd         INTEGER,
    record_ok                   INTEGER NOT NULL,
    created                     TEXT,
    updated                     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS capacity (
    origin                      TEXT NOT NULL,
    destination                 TEXT NOT NULL,
    operating_airline           TEXT NOT NULL,
    operating_airline_ref_code  TEXT NOT NULL,
    year_month                  TEXT NOT NULL,
    capacity                    INTEGER NOT NULL,
    active                      INTEGER NOT NULL
);
";

/// Durable store: SQLite for persistence, a [`MemoryStore`] working set for
/// queries. Mutations write through; reads never touch the database after
/// open.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    mem: MemoryStore,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

fn to_json<T: Serialize>(what: &str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        what: what.to_string(),
        detail: e.to_string(),
    })
}

fn from_json<T: DeserializeOwned>(what: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        what: what.to_string(),
        detail: e.to_string(),
    })
}

fn parse_date(what: &str, raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| StoreError::Corrupt {
        what: what.to_string(),
        detail: e.to_string(),
    })
}

fn parse_ym(what: &str, raw: &str) -> StoreResult<YearMonth> {
    raw.parse().map_err(|_| StoreError::Corrupt {
        what: what.to_string(),
        detail: format!("bad year-month '{raw}'"),
    })
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            conn: Mutex::new(conn),
            mem: MemoryStore::new(),
        };
        store.load_working_set()?;
        Ok(store)
    }

    fn load_working_set(&self) -> StoreResult<()> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT name, confidence, ym_start, import_process FROM providers",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;
        for row in rows {
            let (name, confidence, ym_start, import_process) = row?;
            self.mem.load_provider(Provider {
                name,
                confidence,
                ym_start: parse_ym("provider.ym_start", &ym_start)?,
                import_process,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT id, provider, data_type, scope, total_pax, revenue, source_date, \
             overlap, ratio FROM external_records",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;
        for row in rows {
            let (id, provider, data_type, scope, total_pax, revenue, source_date, overlap, ratio) =
                row?;
            self.mem.load_record(ExternalRecord {
                id: RecordId(id as u64),
                provider,
                data_type,
                scope: from_json::<Scope>("record.scope", &scope)?,
                total_pax: total_pax as u64,
                revenue,
                source_date: parse_date("record.source_date", &source_date)?,
                overlap: from_json("record.overlap", &overlap)?,
                ratio: match ratio {
                    Some(raw) => Some(from_json::<Ratio>("record.ratio", &raw)?),
                    None => None,
                },
            });
        }

        let mut stmt = conn.prepare(
            "SELECT id, origin, destination, operating_airline, operating_airline_ref_code, \
             year_month, cabin_class, segment_split, passengers, segment_revenue_usd, \
             record_ok, created, updated FROM segments",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, Option<i64>>(9)?,
                row.get::<_, bool>(10)?,
                row.get::<_, Option<String>>(11)?,
                row.get::<_, String>(12)?,
            ))
        })?;
        for row in rows {
            let (
                id,
                origin,
                destination,
                operating_airline,
                operating_airline_ref_code,
                year_month,
                cabin_class,
                segment_split,
                passengers,
                segment_revenue_usd,
                record_ok,
                created,
                updated,
            ) = row?;
            self.mem.load_segment(Segment {
                id: SegmentId(id as u64),
                origin,
                destination,
                operating_airline,
                operating_airline_ref_code,
                year_month: parse_ym("segment.year_month", &year_month)?,
                cabin_class,
                segment_split,
                passengers: passengers as u64,
                segment_revenue_usd: segment_revenue_usd.map(|v| v as u64),
                record_ok,
                created: match created {
                    Some(raw) => Some(from_json::<CreationStamp>("segment.created", &raw)?),
                    None => None,
                },
                updated: from_json::<Vec<HistoryEntry>>("segment.updated", &updated)?,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT origin, destination, operating_airline, operating_airline_ref_code, \
             year_month, capacity, active FROM capacity",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, bool>(6)?,
            ))
        })?;
        for row in rows {
            let (origin, destination, operating_airline, operating_airline_ref_code, ym, capacity, active) =
                row?;
            self.mem.load_capacity(CapacityRecord {
                origin,
                destination,
                operating_airline,
                operating_airline_ref_code,
                year_month: parse_ym("capacity.year_month", &ym)?,
                capacity: capacity as u64,
                active,
            });
        }

        Ok(())
    }

    /// Persist the overlap/ratio columns of one record from the working set.
    fn persist_record_marks(&self, id: RecordId) -> StoreResult<()> {
        let rec = self
            .mem
            .record(id)?
            .ok_or_else(|| StoreError::MissingRow(format!("record {id}")))?;
        let overlap = to_json("record.overlap", &rec.overlap)?;
        let ratio = match &rec.ratio {
            Some(r) => Some(to_json("record.ratio", r)?),
            None => None,
        };
        self.conn.lock().execute(
            "UPDATE external_records SET overlap = ?1, ratio = ?2 WHERE id = ?3",
            params![overlap, ratio, rec.id.0 as i64],
        )?;
        Ok(())
    }

    fn persist_segment(conn: &Connection, seg: &Segment) -> StoreResult<()> {
        let created = match &seg.created {
            Some(c) => Some(to_json("segment.created", c)?),
            None => None,
        };
        let updated = to_json("segment.updated", &seg.updated)?;
        conn.execute(
            "INSERT OR REPLACE INTO segments \
             (id, origin, destination, operating_airline, operating_airline_ref_code, \
              year_month, cabin_class, segment_split, passengers, segment_revenue_usd, \
              record_ok, created, updated) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                seg.id.0 as i64,
                seg.origin,
                seg.destination,
                seg.operating_airline,
                seg.operating_airline_ref_code,
                seg.year_month.to_string(),
                seg.cabin_class,
                seg.segment_split,
                seg.passengers as i64,
                seg.segment_revenue_usd.map(|v| v as i64),
                seg.record_ok,
                created,
                updated,
            ],
        )?;
        Ok(())
    }
}

impl ExternalRecords for SqliteStore {
    fn insert(&self, record: NewExternalRecord) -> StoreResult<RecordId> {
        let id = self.mem.insert(record)?;
        let rec = self
            .mem
            .record(id)?
            .ok_or_else(|| StoreError::MissingRow(format!("record {id}")))?;
        let scope = to_json("record.scope", &rec.scope)?;
        let overlap = to_json("record.overlap", &rec.overlap)?;
        self.conn.lock().execute(
            "INSERT INTO external_records \
             (id, provider, data_type, scope, total_pax, revenue, source_date, overlap, ratio) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)",
            params![
                rec.id.0 as i64,
                rec.provider,
                rec.data_type,
                scope,
                rec.total_pax as i64,
                rec.revenue,
                rec.source_date.format("%Y-%m-%d").to_string(),
                overlap,
            ],
        )?;
        Ok(id)
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<ExternalRecord>> {
        self.mem.record(id)
    }

    fn for_month(&self, ym: YearMonth, providers: &[String]) -> StoreResult<Vec<ExternalRecord>> {
        self.mem.for_month(ym, providers)
    }

    fn add_overlap(&self, id: RecordId, other: RecordId) -> StoreResult<bool> {
        let added = self.mem.add_overlap(id, other)?;
        if added {
            self.persist_record_marks(id)?;
        }
        Ok(added)
    }

    fn clear_overlap(&self, id: RecordId) -> StoreResult<()> {
        self.mem.clear_overlap(id)?;
        self.persist_record_marks(id)
    }

    fn reset_overlaps(&self, ym: YearMonth, providers: &[String]) -> StoreResult<usize> {
        let reset = self.mem.reset_overlaps(ym, providers)?;
        if reset > 0 {
            for rec in self.mem.for_month(ym, providers)? {
                self.persist_record_marks(rec.id)?;
            }
        }
        Ok(reset)
    }

    fn set_ratio(&self, id: RecordId, ratio: Ratio) -> StoreResult<()> {
        self.mem.set_ratio(id, ratio)?;
        self.persist_record_marks(id)
    }
}

impl Providers for SqliteStore {
    fn upsert(&self, provider: Provider) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO providers (name, confidence, ym_start, import_process) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                provider.name,
                provider.confidence,
                provider.ym_start.to_string(),
                provider.import_process,
            ],
        )?;
        self.mem.upsert(provider)
    }

    fn import_enabled(&self) -> StoreResult<Vec<String>> {
        self.mem.import_enabled()
    }

    fn confidence_as_of(&self, ym: YearMonth) -> StoreResult<ConfidenceTable> {
        self.mem.confidence_as_of(ym)
    }
}

impl Segments for SqliteStore {
    fn segment(&self, id: SegmentId) -> StoreResult<Option<Segment>> {
        self.mem.segment(id)
    }

    fn insert_base(&self, segment: BaseSegment) -> StoreResult<SegmentId> {
        let id = self.mem.insert_base(segment)?;
        let seg = self
            .mem
            .segment(id)?
            .ok_or_else(|| StoreError::MissingRow(format!("segment {id}")))?;
        Self::persist_segment(&self.conn.lock(), &seg)?;
        Ok(id)
    }

    fn matching(&self, scope: &Scope) -> StoreResult<Vec<Segment>> {
        self.mem.matching(scope)
    }

    fn updated_on(&self, ym: YearMonth, day: NaiveDate) -> StoreResult<Vec<Segment>> {
        self.mem.updated_on(ym, day)
    }

    fn created_on(&self, ym: YearMonth, day: NaiveDate) -> StoreResult<Vec<Segment>> {
        self.mem.created_on(ym, day)
    }

    fn apply(&self, batch: Vec<SegmentWrite>) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for write in &batch {
            let id = self.mem.apply_one(write)?;
            match write {
                SegmentWrite::Remove(_) => {
                    tx.execute("DELETE FROM segments WHERE id = ?1", params![id.0 as i64])?;
                }
                _ => {
                    let seg = self
                        .mem
                        .segment(id)?
                        .ok_or_else(|| StoreError::MissingRow(format!("segment {id}")))?;
                    Self::persist_segment(&tx, &seg)?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl Capacity for SqliteStore {
    fn load(&self, record: CapacityRecord) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT INTO capacity \
             (origin, destination, operating_airline, operating_airline_ref_code, \
              year_month, capacity, active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.origin,
                record.destination,
                record.operating_airline,
                record.operating_airline_ref_code,
                record.year_month.to_string(),
                record.capacity as i64,
                record.active,
            ],
        )?;
        self.mem.load_capacity(record);
        Ok(())
    }

    fn aggregated(&self, scope: &Scope) -> StoreResult<Vec<CapacityBucket>> {
        self.mem.aggregated(scope)
    }
}
