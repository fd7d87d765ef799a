//! In-memory `LocationStore` with call recording and failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geo_sync::database_ops::locations::models::{
    DistrictRow, DistrictWardCount, OrphanCounts, ProvinceRow, SyncMetadata, TableCounts, WardRow,
};
use geo_sync::database_ops::locations::LocationStore;
use geo_sync::{SyncError, SyncResult};

#[derive(Default)]
struct Inner {
    provinces: BTreeMap<i64, ProvinceRow>,
    districts: BTreeMap<i64, DistrictRow>,
    wards: BTreeMap<i64, WardRow>,
    metadata: HashMap<String, SyncMetadata>,
    /// (entity, batch size) per upsert call, in order.
    calls: Vec<(&'static str, usize)>,
    district_calls: usize,
    failing_district_calls: HashSet<usize>,
    ward_calls: usize,
    failing_ward_calls: HashSet<usize>,
    fail_provinces: bool,
}

/// Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the n-th (0-based) ward upsert call fail.
    pub fn fail_ward_call(&self, n: usize) {
        self.inner.lock().unwrap().failing_ward_calls.insert(n);
    }

    /// Make the n-th (0-based) district upsert call fail.
    pub fn fail_district_call(&self, n: usize) {
        self.inner.lock().unwrap().failing_district_calls.insert(n);
    }

    pub fn fail_all_province_writes(&self) {
        self.inner.lock().unwrap().fail_provinces = true;
    }

    pub fn calls(&self) -> Vec<(&'static str, usize)> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_sizes(&self, entity: &str) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter(|(e, _)| *e == entity)
            .map(|(_, n)| n)
            .collect()
    }

    pub fn provinces(&self) -> Vec<ProvinceRow> {
        self.inner.lock().unwrap().provinces.values().cloned().collect()
    }

    pub fn districts(&self) -> Vec<DistrictRow> {
        self.inner.lock().unwrap().districts.values().cloned().collect()
    }

    pub fn wards(&self) -> Vec<WardRow> {
        self.inner.lock().unwrap().wards.values().cloned().collect()
    }

    pub fn metadata(&self, key: &str) -> Option<SyncMetadata> {
        self.inner.lock().unwrap().metadata.get(key).cloned()
    }

    pub fn seed_district(&self, row: DistrictRow) {
        self.inner.lock().unwrap().districts.insert(row.code, row);
    }

    pub fn seed_province(&self, row: ProvinceRow) {
        self.inner.lock().unwrap().provinces.insert(row.code, row);
    }

    pub fn seed_ward(&self, row: WardRow) {
        self.inner.lock().unwrap().wards.insert(row.code, row);
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn upsert_provinces(&self, rows: &[ProvinceRow]) -> SyncResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(("province", rows.len()));
        if inner.fail_provinces {
            return Err(SyncError::Persistence("provinces table is read-only".into()));
        }
        for r in rows {
            inner.provinces.insert(r.code, r.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_districts(&self, rows: &[DistrictRow]) -> SyncResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(("district", rows.len()));
        let call = inner.district_calls;
        inner.district_calls += 1;
        if inner.failing_district_calls.contains(&call) {
            return Err(SyncError::Persistence(format!(
                "foreign key violation (district call {call})"
            )));
        }
        for r in rows {
            inner.districts.insert(r.code, r.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_wards(&self, rows: &[WardRow]) -> SyncResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(("ward", rows.len()));
        let call = inner.ward_calls;
        inner.ward_calls += 1;
        if inner.failing_ward_calls.contains(&call) {
            return Err(SyncError::Persistence(format!(
                "payload too large (ward call {call})"
            )));
        }
        for r in rows {
            inner.wards.insert(r.code, r.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn table_counts(&self) -> SyncResult<TableCounts> {
        let inner = self.inner.lock().unwrap();
        Ok(TableCounts {
            provinces: inner.provinces.len() as i64,
            districts: inner.districts.len() as i64,
            wards: inner.wards.len() as i64,
        })
    }

    async fn district_ward_counts(&self) -> SyncResult<Vec<DistrictWardCount>> {
        let inner = self.inner.lock().unwrap();
        let mut per_district: HashMap<i64, i64> = HashMap::new();
        for w in inner.wards.values() {
            *per_district.entry(w.district_code).or_default() += 1;
        }
        Ok(inner
            .districts
            .values()
            .map(|d| DistrictWardCount {
                code: d.code,
                name: d.name.clone(),
                province_code: d.province_code,
                ward_count: per_district.get(&d.code).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn orphan_counts(&self) -> SyncResult<OrphanCounts> {
        let inner = self.inner.lock().unwrap();
        Ok(OrphanCounts {
            districts: inner
                .districts
                .values()
                .filter(|d| !inner.provinces.contains_key(&d.province_code))
                .count() as i64,
            wards: inner
                .wards
                .values()
                .filter(|w| !inner.districts.contains_key(&w.district_code))
                .count() as i64,
        })
    }

    async fn read_metadata(&self, cache_key: &str) -> SyncResult<Option<SyncMetadata>> {
        Ok(self.inner.lock().unwrap().metadata.get(cache_key).cloned())
    }

    async fn write_metadata(&self, metadata: &SyncMetadata) -> SyncResult<()> {
        self.inner
            .lock()
            .unwrap()
            .metadata
            .insert(metadata.cache_key.clone(), metadata.clone());
        Ok(())
    }
}
