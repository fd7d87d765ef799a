use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SyncResult;

use super::models::{DistrictWardCount, OrphanCounts, SyncMetadata, TableCounts};
use super::store::LocationStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvinceCoverage {
    pub total: usize,
    pub with_wards: usize,
    pub without_wards: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountDrift {
    pub table: &'static str,
    pub live: i64,
    pub recorded: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub counts: TableCounts,
    pub metadata: Option<SyncMetadata>,
    /// Tables whose live count differs from the stored metadata.
    pub drift: Vec<CountDrift>,
    pub orphans: OrphanCounts,
}

impl VerificationReport {
    /// Metadata present, matching the live counts, and no dangling parents.
    pub fn is_consistent(&self) -> bool {
        self.metadata.is_some()
            && self.drift.is_empty()
            && self.orphans == OrphanCounts::default()
    }
}

/// Post-sync bookkeeping: per-parent counts, gap detection, metadata.
pub struct CoverageAuditor<'a> {
    store: &'a dyn LocationStore,
    ward_threshold: u32,
    metadata_key: &'a str,
}

impl<'a> CoverageAuditor<'a> {
    pub fn new(store: &'a dyn LocationStore, ward_threshold: u32, metadata_key: &'a str) -> Self {
        Self {
            store,
            ward_threshold,
            metadata_key,
        }
    }

    fn below_threshold(&self, d: &DistrictWardCount) -> bool {
        d.ward_count < i64::from(self.ward_threshold)
    }

    pub async fn compute_district_coverage(&self) -> SyncResult<BTreeMap<i64, ProvinceCoverage>> {
        let mut out: BTreeMap<i64, ProvinceCoverage> = BTreeMap::new();
        for d in self.store.district_ward_counts().await? {
            let entry = out.entry(d.province_code).or_default();
            entry.total += 1;
            if self.below_threshold(&d) {
                entry.without_wards += 1;
            } else {
                entry.with_wards += 1;
            }
        }
        Ok(out)
    }

    /// Districts under the ward threshold, ordered by code, each with its
    /// current ward count.
    pub async fn list_districts_needing_wards(&self) -> SyncResult<Vec<DistrictWardCount>> {
        let mut out: Vec<DistrictWardCount> = self
            .store
            .district_ward_counts()
            .await?
            .into_iter()
            .filter(|d| self.below_threshold(d))
            .collect();
        out.sort_by_key(|d| d.code);
        info!(
            count = out.len(),
            threshold = self.ward_threshold,
            "districts needing wards"
        );
        Ok(out)
    }

    pub async fn current_counts(&self) -> SyncResult<TableCounts> {
        self.store.table_counts().await
    }

    /// Overwrites the metadata row for the configured key.
    pub async fn write_sync_metadata(&self, counts: &TableCounts) -> SyncResult<SyncMetadata> {
        let metadata = SyncMetadata::from_counts(self.metadata_key, counts, Utc::now());
        self.store.write_metadata(&metadata).await?;
        info!(
            cache_key = self.metadata_key,
            provinces = counts.provinces,
            districts = counts.districts,
            wards = counts.wards,
            "sync metadata written"
        );
        Ok(metadata)
    }

    pub async fn verify(&self) -> SyncResult<VerificationReport> {
        let counts = self.store.table_counts().await?;
        let metadata = self.store.read_metadata(self.metadata_key).await?;
        let orphans = self.store.orphan_counts().await?;

        let mut drift = Vec::new();
        match &metadata {
            Some(meta) => {
                let recorded = meta.counts();
                for (table, live, rec) in [
                    ("provinces", counts.provinces, recorded.provinces),
                    ("districts", counts.districts, recorded.districts),
                    ("wards", counts.wards, recorded.wards),
                ] {
                    if live != rec {
                        drift.push(CountDrift {
                            table,
                            live,
                            recorded: rec,
                        });
                    }
                }
            }
            None => warn!(cache_key = self.metadata_key, "no sync metadata recorded"),
        }
        if !drift.is_empty() {
            warn!(drift = ?drift, "metadata counts drifted from live tables");
        }
        if orphans != OrphanCounts::default() {
            warn!(
                orphan_districts = orphans.districts,
                orphan_wards = orphans.wards,
                "dangling parent references"
            );
        }
        Ok(VerificationReport {
            counts,
            metadata,
            drift,
            orphans,
        })
    }
}
