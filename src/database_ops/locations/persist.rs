//! Chunked, idempotent writes. A failed batch is logged and recorded, never
//! retried within the run; later batches still go out.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

use super::models::{Coded, DistrictRow, ProvinceRow, WardRow};
use super::store::LocationStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// 0-based batch index within the call.
    pub batch: usize,
    pub rows: usize,
    pub codes: Vec<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Rows handed to the store after de-duplication.
    pub attempted: usize,
    /// Sum of the sizes of the batches that succeeded.
    pub written: usize,
    pub batches: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Codes of every row that sat in a failed batch.
    pub fn failed_codes(&self) -> HashSet<i64> {
        self.failures
            .iter()
            .flat_map(|f| f.codes.iter().copied())
            .collect()
    }
}

/// Row types the writer knows how to send to a [`LocationStore`].
#[async_trait]
pub trait Upsertable: Coded + Clone + Send + Sync + Sized {
    const ENTITY: &'static str;
    async fn upsert_batch(store: &dyn LocationStore, rows: &[Self]) -> SyncResult<u64>;
}

#[async_trait]
impl Upsertable for ProvinceRow {
    const ENTITY: &'static str = "province";
    async fn upsert_batch(store: &dyn LocationStore, rows: &[Self]) -> SyncResult<u64> {
        store.upsert_provinces(rows).await
    }
}

#[async_trait]
impl Upsertable for DistrictRow {
    const ENTITY: &'static str = "district";
    async fn upsert_batch(store: &dyn LocationStore, rows: &[Self]) -> SyncResult<u64> {
        store.upsert_districts(rows).await
    }
}

#[async_trait]
impl Upsertable for WardRow {
    const ENTITY: &'static str = "ward";
    async fn upsert_batch(store: &dyn LocationStore, rows: &[Self]) -> SyncResult<u64> {
        store.upsert_wards(rows).await
    }
}

/// Keeps the last occurrence of each code, in first-seen order. One
/// `ON CONFLICT DO UPDATE` statement may not touch the same key twice.
pub fn dedup_by_code<R: Coded + Clone>(rows: &[R]) -> Vec<R> {
    let mut index: HashMap<i64, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<R> = Vec::with_capacity(rows.len());
    for row in rows {
        match index.get(&row.code()) {
            Some(&i) => out[i] = row.clone(),
            None => {
                index.insert(row.code(), out.len());
                out.push(row.clone());
            }
        }
    }
    out
}

async fn write_chunked<R: Upsertable>(
    store: &dyn LocationStore,
    rows: &[R],
    batch_size: usize,
) -> BatchReport {
    let rows = dedup_by_code(rows);
    let mut report = BatchReport {
        attempted: rows.len(),
        ..BatchReport::default()
    };
    for (batch, chunk) in rows.chunks(batch_size.max(1)).enumerate() {
        report.batches += 1;
        match R::upsert_batch(store, chunk).await {
            Ok(_) => report.written += chunk.len(),
            Err(e) => {
                let codes: Vec<i64> = chunk.iter().map(Coded::code).collect();
                warn!(
                    entity = R::ENTITY,
                    batch,
                    rows = chunk.len(),
                    first_code = codes.first().copied().unwrap_or_default(),
                    error = %e,
                    "batch upsert failed; skipping"
                );
                report.failures.push(BatchFailure {
                    batch,
                    rows: chunk.len(),
                    codes,
                    message: e.to_string(),
                });
            }
        }
    }
    info!(
        entity = R::ENTITY,
        attempted = report.attempted,
        written = report.written,
        failed_batches = report.failures.len(),
        "upsert finished"
    );
    report
}

pub struct LocationWriter<'a> {
    store: &'a dyn LocationStore,
    province_batch_size: usize,
    district_batch_size: usize,
    ward_batch_size: usize,
}

impl<'a> LocationWriter<'a> {
    pub fn new(store: &'a dyn LocationStore, cfg: &SyncConfig) -> Self {
        Self {
            store,
            province_batch_size: cfg.province_batch_size,
            district_batch_size: cfg.district_batch_size,
            ward_batch_size: cfg.ward_batch_size,
        }
    }

    /// Errors only when there was something to write and every batch failed.
    pub async fn upsert_provinces(&self, rows: &[ProvinceRow]) -> SyncResult<BatchReport> {
        let report = write_chunked(self.store, rows, self.province_batch_size).await;
        if report.attempted > 0 && report.written == 0 {
            let detail = report
                .failures
                .first()
                .map(|f| f.message.clone())
                .unwrap_or_default();
            return Err(SyncError::Persistence(format!(
                "no province batch could be written: {detail}"
            )));
        }
        Ok(report)
    }

    pub async fn upsert_districts(&self, rows: &[DistrictRow]) -> BatchReport {
        write_chunked(self.store, rows, self.district_batch_size).await
    }

    pub async fn upsert_wards(&self, rows: &[WardRow]) -> BatchReport {
        write_chunked(self.store, rows, self.ward_batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ward(code: i64, name: &str) -> WardRow {
        WardRow {
            code,
            name: name.to_string(),
            codename: name.to_lowercase(),
            division_type: "phường".into(),
            short_codename: None,
            district_code: 1,
        }
    }

    #[test]
    fn dedup_keeps_last_value_in_first_seen_order() {
        let rows = vec![ward(3, "A"), ward(1, "B"), ward(3, "C"), ward(2, "D")];
        let out = dedup_by_code(&rows);
        let codes: Vec<i64> = out.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![3, 1, 2]);
        assert_eq!(out[0].name, "C");
    }

    #[test]
    fn failed_codes_collects_every_failed_batch() {
        let mut report = BatchReport::default();
        assert!(report.is_complete());
        for (batch, codes) in [(1, vec![4, 5]), (3, vec![9])] {
            report.failures.push(BatchFailure {
                batch,
                rows: codes.len(),
                codes,
                message: "x".into(),
            });
        }
        assert!(!report.is_complete());
        let failed = report.failed_codes();
        assert_eq!(failed.len(), 3);
        assert!(failed.contains(&4) && failed.contains(&9));
    }
}
