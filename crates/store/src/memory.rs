use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use parking_lot::RwLock;

use paxlane_core::{
    BaseSegment, CapacityRecord, ConfidenceTable, ExternalRecord, NewExternalRecord, Provider,
    Ratio, RecordId, Scope, Segment, SegmentId, YearMonth,
};

use crate::error::{StoreError, StoreResult};
use crate::{Capacity, CapacityBucket, ExternalRecords, Providers, SegmentWrite, Segments};

/// In-memory store backing all four contracts. The working set for a run,
/// and the store the test suite drives.
///
/// Maps are BTreeMaps so iteration order follows ids, keeping runs
/// deterministic.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordId, ExternalRecord>>,
    providers: RwLock<BTreeMap<String, Provider>>,
    segments: RwLock<BTreeMap<SegmentId, Segment>>,
    capacity: RwLock<Vec<CapacityRecord>>,
    next_record_id: AtomicU64,
    next_segment_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fully-formed record, preserving its id. Used when a durable
    /// backend restores its working set.
    pub(crate) fn load_record(&self, record: ExternalRecord) {
        let id = record.id.0;
        self.next_record_id.fetch_max(id + 1, Ordering::SeqCst);
        self.records.write().insert(record.id, record);
    }

    pub(crate) fn load_provider(&self, provider: Provider) {
        self.providers.write().insert(provider.name.clone(), provider);
    }

    pub(crate) fn load_segment(&self, segment: Segment) {
        let id = segment.id.0;
        self.next_segment_id.fetch_max(id + 1, Ordering::SeqCst);
        self.segments.write().insert(segment.id, segment);
    }

    pub(crate) fn load_capacity(&self, record: CapacityRecord) {
        self.capacity.write().push(record);
    }

    /// Apply a single write, returning the affected segment id.
    pub(crate) fn apply_one(&self, write: &SegmentWrite) -> StoreResult<SegmentId> {
        let mut segments = self.segments.write();
        match write {
            SegmentWrite::Update { id, new, entry } => {
                let seg = segments
                    .get_mut(id)
                    .ok_or_else(|| StoreError::MissingRow(format!("segment {id}")))?;
                seg.passengers = new.passengers;
                seg.segment_revenue_usd = new.segment_revenue_usd;
                seg.updated.push(entry.clone());
                Ok(*id)
            }
            SegmentWrite::Insert(new) => {
                let id = SegmentId(self.next_segment_id.fetch_add(1, Ordering::SeqCst));
                segments.insert(
                    id,
                    Segment {
                        id,
                        origin: new.origin.clone(),
                        destination: new.destination.clone(),
                        operating_airline: new.operating_airline.clone(),
                        operating_airline_ref_code: new.operating_airline_ref_code.clone(),
                        year_month: new.year_month,
                        cabin_class: "EC".into(),
                        segment_split: "Local".into(),
                        passengers: new.passengers,
                        segment_revenue_usd: new.segment_revenue_usd,
                        record_ok: true,
                        created: Some(new.created.clone()),
                        updated: Vec::new(),
                    },
                );
                Ok(id)
            }
            SegmentWrite::Revert { id, restore, pop } => {
                let seg = segments
                    .get_mut(id)
                    .ok_or_else(|| StoreError::MissingRow(format!("segment {id}")))?;
                if seg.updated.len() < *pop {
                    return Err(StoreError::Corrupt {
                        what: format!("segment {id} history"),
                        detail: format!("cannot pop {} of {} entries", pop, seg.updated.len()),
                    });
                }
                let keep = seg.updated.len() - pop;
                seg.updated.truncate(keep);
                seg.passengers = restore.passengers;
                seg.segment_revenue_usd = restore.segment_revenue_usd;
                Ok(*id)
            }
            SegmentWrite::Remove(id) => {
                segments
                    .remove(id)
                    .ok_or_else(|| StoreError::MissingRow(format!("segment {id}")))?;
                Ok(*id)
            }
        }
    }
}

impl ExternalRecords for MemoryStore {
    fn insert(&self, record: NewExternalRecord) -> StoreResult<RecordId> {
        let id = RecordId(self.next_record_id.fetch_add(1, Ordering::SeqCst));
        self.records.write().insert(
            id,
            ExternalRecord {
                id,
                provider: record.provider,
                data_type: record.data_type,
                scope: record.scope,
                total_pax: record.total_pax,
                revenue: record.revenue,
                source_date: record.source_date,
                overlap: BTreeSet::new(),
                ratio: None,
            },
        );
        Ok(id)
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<ExternalRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    fn for_month(&self, ym: YearMonth, providers: &[String]) -> StoreResult<Vec<ExternalRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.scope.months.contains(&ym))
            .filter(|r| providers.iter().any(|p| *p == r.provider))
            .cloned()
            .collect())
    }

    fn add_overlap(&self, id: RecordId, other: RecordId) -> StoreResult<bool> {
        let mut records = self.records.write();
        let rec = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("record {id}")))?;
        Ok(rec.overlap.insert(other))
    }

    fn clear_overlap(&self, id: RecordId) -> StoreResult<()> {
        let mut records = self.records.write();
        let rec = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("record {id}")))?;
        rec.overlap.clear();
        Ok(())
    }

    fn reset_overlaps(&self, ym: YearMonth, providers: &[String]) -> StoreResult<usize> {
        let mut records = self.records.write();
        let mut reset = 0;
        for rec in records.values_mut() {
            if rec.scope.months.contains(&ym)
                && providers.iter().any(|p| *p == rec.provider)
                && !rec.overlap.is_empty()
            {
                rec.overlap.clear();
                reset += 1;
            }
        }
        Ok(reset)
    }

    fn set_ratio(&self, id: RecordId, ratio: Ratio) -> StoreResult<()> {
        let mut records = self.records.write();
        let rec = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("record {id}")))?;
        rec.ratio = Some(ratio);
        Ok(())
    }
}

impl Providers for MemoryStore {
    fn upsert(&self, provider: Provider) -> StoreResult<()> {
        self.providers.write().insert(provider.name.clone(), provider);
        Ok(())
    }

    fn import_enabled(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .providers
            .read()
            .values()
            .filter(|p| p.import_process)
            .map(|p| p.name.clone())
            .collect())
    }

    fn confidence_as_of(&self, ym: YearMonth) -> StoreResult<ConfidenceTable> {
        let mut table = ConfidenceTable::new();
        for provider in self.providers.read().values() {
            if provider.ym_start <= ym {
                table.insert(provider.name.clone(), provider.confidence);
            }
        }
        Ok(table)
    }
}

impl Segments for MemoryStore {
    fn segment(&self, id: SegmentId) -> StoreResult<Option<Segment>> {
        Ok(self.segments.read().get(&id).cloned())
    }

    fn insert_base(&self, segment: BaseSegment) -> StoreResult<SegmentId> {
        let id = SegmentId(self.next_segment_id.fetch_add(1, Ordering::SeqCst));
        self.segments.write().insert(
            id,
            Segment {
                id,
                origin: segment.origin,
                destination: segment.destination,
                operating_airline: segment.operating_airline,
                operating_airline_ref_code: segment.operating_airline_ref_code,
                year_month: segment.year_month,
                cabin_class: segment.cabin_class,
                segment_split: segment.segment_split,
                passengers: segment.passengers,
                segment_revenue_usd: segment.segment_revenue_usd,
                record_ok: segment.record_ok,
                created: None,
                updated: Vec::new(),
            },
        );
        Ok(id)
    }

    fn matching(&self, scope: &Scope) -> StoreResult<Vec<Segment>> {
        Ok(self
            .segments
            .read()
            .values()
            .filter(|s| s.record_ok)
            .filter(|s| {
                scope.matches_segment(
                    &s.origin,
                    &s.destination,
                    &s.operating_airline,
                    s.year_month,
                )
            })
            .cloned()
            .collect())
    }

    fn updated_on(&self, ym: YearMonth, day: NaiveDate) -> StoreResult<Vec<Segment>> {
        Ok(self
            .segments
            .read()
            .values()
            .filter(|s| s.year_month == ym)
            .filter(|s| s.updated.iter().any(|e| e.on.date_naive() == day))
            .cloned()
            .collect())
    }

    fn created_on(&self, ym: YearMonth, day: NaiveDate) -> StoreResult<Vec<Segment>> {
        Ok(self
            .segments
            .read()
            .values()
            .filter(|s| s.year_month == ym && s.record_ok && s.updated.is_empty())
            .filter(|s| {
                s.created
                    .as_ref()
                    .is_some_and(|c| c.on.date_naive() == day)
            })
            .cloned()
            .collect())
    }

    fn apply(&self, batch: Vec<SegmentWrite>) -> StoreResult<()> {
        for write in &batch {
            self.apply_one(write)?;
        }
        Ok(())
    }
}

impl Capacity for MemoryStore {
    fn load(&self, record: CapacityRecord) -> StoreResult<()> {
        self.capacity.write().push(record);
        Ok(())
    }

    fn aggregated(&self, scope: &Scope) -> StoreResult<Vec<CapacityBucket>> {
        let mut buckets: BTreeMap<(String, String, String, String, YearMonth), u64> =
            BTreeMap::new();
        for cap in self.capacity.read().iter() {
            if !cap.active || cap.capacity == 0 {
                continue;
            }
            if !scope.matches_capacity(
                &cap.origin,
                &cap.destination,
                &cap.operating_airline,
                &cap.operating_airline_ref_code,
                cap.year_month,
            ) {
                continue;
            }
            let key = (
                cap.origin.clone(),
                cap.destination.clone(),
                cap.operating_airline.clone(),
                cap.operating_airline_ref_code.clone(),
                cap.year_month,
            );
            *buckets.entry(key).or_insert(0) += cap.capacity;
        }
        Ok(buckets
            .into_iter()
            .map(|((origin, destination, airline, ref_code, ym), capacity)| CapacityBucket {
                origin,
                destination,
                operating_airline: airline,
                operating_airline_ref_code: ref_code,
                year_month: ym,
                capacity,
            })
            .collect())
    }
}
