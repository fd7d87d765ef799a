//! Run orchestration: provinces → districts → wards → metadata → verify.
//!
//! Runs are strictly sequential and never abort on a unit failure: a failed
//! fetch, malformed record or rejected batch becomes a [`UnitError`] in the
//! summary and the walk continues with the next unit. Nothing is rolled
//! back; a later `sync-remaining` run heals the gaps the coverage audit finds.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::SyncConfig;
use crate::error::SyncError;

use super::client::LocationSource;
use super::coverage::{CoverageAuditor, VerificationReport};
use super::models::{DistrictRow, ProvinceRow, SyncMetadata, WardRow};
use super::persist::{BatchReport, LocationWriter};
use super::progress::{ProgressReporter, SyncEvent, TracingReporter};
use super::store::LocationStore;
use super::transform::{to_district_row, to_province_row, to_ward_row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Full,
    Provinces,
    Verify,
    SyncRemaining,
}

/// How far a run got. Later stages imply the earlier ones completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    NotStarted,
    ProvincesSynced,
    DistrictsSynced,
    WardsSynced { complete: bool },
    MetadataWritten,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitError {
    pub unit: String,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityTally {
    /// Records received from upstream.
    pub fetched: usize,
    /// Rows that landed in the store.
    pub written: usize,
    pub units_ok: usize,
    pub units_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub mode: RunMode,
    pub stage: SyncStage,
    pub provinces: EntityTally,
    pub districts: EntityTally,
    pub wards: EntityTally,
    pub errors: Vec<UnitError>,
    pub elapsed_ms: u64,
    pub metadata: Option<SyncMetadata>,
    pub verification: Option<VerificationReport>,
}

impl SyncSummary {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            stage: SyncStage::NotStarted,
            provinces: EntityTally::default(),
            districts: EntityTally::default(),
            wards: EntityTally::default(),
            errors: Vec::new(),
            elapsed_ms: 0,
            metadata: None,
            verification: None,
        }
    }

    pub fn reached_verified(&self) -> bool {
        self.stage == SyncStage::Verified
    }
}

struct Run<'r> {
    summary: SyncSummary,
    started: Instant,
    reporter: &'r dyn ProgressReporter,
}

impl<'r> Run<'r> {
    fn new(mode: RunMode, reporter: &'r dyn ProgressReporter) -> Self {
        info!(mode = ?mode, "location sync started");
        Self {
            summary: SyncSummary::new(mode),
            started: Instant::now(),
            reporter,
        }
    }

    fn fail(&mut self, unit: impl Into<String>, err: &SyncError) {
        let unit = unit.into();
        self.reporter.report(&SyncEvent::UnitFailed {
            unit: unit.clone(),
            message: err.to_string(),
        });
        self.summary.errors.push(UnitError {
            unit,
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    fn record_batch_failures(&mut self, entity: &str, report: &BatchReport) {
        for f in &report.failures {
            let err = SyncError::Persistence(f.message.clone());
            self.fail(format!("{entity} batch {} ({} rows)", f.batch, f.rows), &err);
        }
    }

    fn advance(&mut self, stage: SyncStage) {
        self.summary.stage = stage;
        self.reporter.report(&SyncEvent::StageReached(stage));
    }

    fn finish(mut self) -> SyncSummary {
        self.summary.elapsed_ms = self.started.elapsed().as_millis() as u64;
        info!(
            mode = ?self.summary.mode,
            stage = ?self.summary.stage,
            errors = self.summary.errors.len(),
            elapsed_ms = self.summary.elapsed_ms,
            "location sync finished"
        );
        self.summary
    }
}

/// Drives the stages over explicitly supplied upstream and store handles.
pub struct LocationSync<U, S> {
    upstream: U,
    store: S,
    cfg: SyncConfig,
    reporter: Box<dyn ProgressReporter>,
}

impl<U: LocationSource, S: LocationStore> LocationSync<U, S> {
    pub fn new(upstream: U, store: S, cfg: SyncConfig) -> Self {
        Self {
            upstream,
            store,
            cfg,
            reporter: Box::new(TracingReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    pub fn auditor(&self) -> CoverageAuditor<'_> {
        CoverageAuditor::new(&self.store, self.cfg.ward_threshold, &self.cfg.metadata_key)
    }

    fn writer(&self) -> LocationWriter<'_> {
        LocationWriter::new(&self.store, &self.cfg)
    }

    /// Cooperative rate limit: a fixed pause after every upstream call.
    async fn pace(&self) {
        if !self.cfg.request_delay.is_zero() {
            tokio::time::sleep(self.cfg.request_delay).await;
        }
    }

    #[instrument(skip(self))]
    pub async fn run_full(&self) -> SyncSummary {
        let mut run = Run::new(RunMode::Full, self.reporter.as_ref());
        let Some(provinces) = self.sync_provinces(&mut run).await else {
            return run.finish();
        };
        run.advance(SyncStage::ProvincesSynced);

        let districts = self.sync_districts(&mut run, &provinces).await;
        run.advance(SyncStage::DistrictsSynced);

        let targets: Vec<i64> = districts
            .iter()
            .filter(|d| self.cfg.ward_scope.includes(d.province_code))
            .map(|d| d.code)
            .collect();
        if targets.len() < districts.len() {
            info!(
                scope = ?self.cfg.ward_scope,
                selected = targets.len(),
                total = districts.len(),
                "ward scope limits districts"
            );
        }
        let complete = self.sync_wards(&mut run, &targets).await;
        run.advance(SyncStage::WardsSynced { complete });

        self.record_and_verify(run).await
    }

    #[instrument(skip(self))]
    pub async fn run_provinces(&self) -> SyncSummary {
        let mut run = Run::new(RunMode::Provinces, self.reporter.as_ref());
        if self.sync_provinces(&mut run).await.is_none() {
            return run.finish();
        }
        run.advance(SyncStage::ProvincesSynced);
        self.record_and_verify(run).await
    }

    /// Re-fetches wards only for districts the coverage audit flags that
    /// also fall inside the configured ward scope.
    #[instrument(skip(self))]
    pub async fn run_sync_remaining(&self) -> SyncSummary {
        let mut run = Run::new(RunMode::SyncRemaining, self.reporter.as_ref());
        let needing = match self.auditor().list_districts_needing_wards().await {
            Ok(v) => v,
            Err(e) => {
                run.fail("coverage audit", &e);
                return run.finish();
            }
        };
        run.advance(SyncStage::DistrictsSynced);

        let targets: Vec<i64> = needing
            .iter()
            .filter(|d| self.cfg.ward_scope.includes(d.province_code))
            .map(|d| d.code)
            .collect();
        if targets.len() < needing.len() {
            info!(
                scope = ?self.cfg.ward_scope,
                selected = targets.len(),
                out_of_scope = needing.len() - targets.len(),
                "ward scope limits remaining districts"
            );
        }
        let complete = self.sync_wards(&mut run, &targets).await;
        run.advance(SyncStage::WardsSynced { complete });

        self.record_and_verify(run).await
    }

    #[instrument(skip(self))]
    pub async fn run_verify(&self) -> SyncSummary {
        let mut run = Run::new(RunMode::Verify, self.reporter.as_ref());
        match self.auditor().verify().await {
            Ok(report) => {
                run.summary.verification = Some(report);
                run.advance(SyncStage::Verified);
            }
            Err(e) => run.fail("verify", &e),
        }
        run.finish()
    }

    /// Returns the provinces that were persisted, or `None` when the run
    /// cannot go on (list fetch failed or no province batch was written).
    async fn sync_provinces(&self, run: &mut Run<'_>) -> Option<Vec<ProvinceRow>> {
        let records = match self.upstream.fetch_province_list().await {
            Ok(v) => v,
            Err(e) => {
                run.fail("province list", &e);
                return None;
            }
        };
        self.pace().await;

        let tally = &mut run.summary.provinces;
        tally.fetched = records.len();
        let mut rows = Vec::with_capacity(records.len());
        let mut malformed = Vec::new();
        for record in &records {
            match to_province_row(record) {
                Ok(row) => rows.push(row),
                Err(e) => malformed.push((record.code, e)),
            }
        }
        run.summary.provinces.units_failed += malformed.len();
        for (code, e) in &malformed {
            run.fail(format!("province {}", display_code(*code)), e);
        }

        let report = match self.writer().upsert_provinces(&rows).await {
            Ok(r) => r,
            Err(e) => {
                run.summary.provinces.units_failed += rows.len();
                run.fail("provinces", &e);
                return None;
            }
        };
        run.record_batch_failures("province", &report);
        let failed = report.failed_codes();
        rows.retain(|r| !failed.contains(&r.code));

        let tally = &mut run.summary.provinces;
        tally.written = report.written;
        tally.units_ok = rows.len();
        tally.units_failed += failed.len();
        run.reporter.report(&SyncEvent::ProvincesWritten {
            fetched: records.len(),
            written: report.written,
        });
        Some(rows)
    }

    /// One unit per province. Returns the districts that were persisted.
    async fn sync_districts(&self, run: &mut Run<'_>, provinces: &[ProvinceRow]) -> Vec<DistrictRow> {
        let mut persisted = Vec::new();
        let total = provinces.len();
        for (index, province) in provinces.iter().enumerate() {
            let unit = format!("districts of province {}", province.code);
            let detail = self.upstream.fetch_province_detail(province.code).await;
            self.pace().await;
            let detail = match detail {
                Ok(d) => d,
                Err(e) => {
                    run.summary.districts.units_failed += 1;
                    run.fail(unit, &e);
                    continue;
                }
            };

            let mut rows = Vec::with_capacity(detail.districts.len());
            let mut lost = 0usize;
            for record in &detail.districts {
                match to_district_row(record, province.code) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        lost += 1;
                        run.fail(
                            format!("district {} of province {}", display_code(record.code), province.code),
                            &e,
                        );
                    }
                }
            }

            let report = self.writer().upsert_districts(&rows).await;
            run.record_batch_failures("district", &report);
            let failed = report.failed_codes();
            rows.retain(|r| !failed.contains(&r.code));

            let tally = &mut run.summary.districts;
            tally.fetched += detail.districts.len();
            tally.written += report.written;
            if lost == 0 && report.is_complete() {
                tally.units_ok += 1;
            } else {
                tally.units_failed += 1;
            }
            run.reporter.report(&SyncEvent::DistrictsSynced {
                province_code: province.code,
                index,
                total,
                fetched: detail.districts.len(),
                written: report.written,
            });
            persisted.extend(rows);
        }
        persisted
    }

    /// One unit per district. Returns whether every unit succeeded.
    async fn sync_wards(&self, run: &mut Run<'_>, district_codes: &[i64]) -> bool {
        let total = district_codes.len();
        let mut complete = true;
        for (index, &district_code) in district_codes.iter().enumerate() {
            let unit = format!("wards of district {district_code}");
            let detail = self.upstream.fetch_district_detail(district_code).await;
            self.pace().await;
            let detail = match detail {
                Ok(d) => d,
                Err(e) => {
                    complete = false;
                    run.summary.wards.units_failed += 1;
                    run.fail(unit, &e);
                    continue;
                }
            };

            let mut rows: Vec<WardRow> = Vec::with_capacity(detail.wards.len());
            let mut lost = 0usize;
            for record in &detail.wards {
                match to_ward_row(record, district_code) {
                    Ok(row) => rows.push(row),
                    Err(e) => {
                        lost += 1;
                        run.fail(
                            format!("ward {} of district {district_code}", display_code(record.code)),
                            &e,
                        );
                    }
                }
            }

            let report = self.writer().upsert_wards(&rows).await;
            run.record_batch_failures("ward", &report);

            let tally = &mut run.summary.wards;
            tally.fetched += detail.wards.len();
            tally.written += report.written;
            if lost == 0 && report.is_complete() {
                tally.units_ok += 1;
            } else {
                complete = false;
                tally.units_failed += 1;
            }
            run.reporter.report(&SyncEvent::WardsSynced {
                district_code,
                index,
                total,
                fetched: detail.wards.len(),
                written: report.written,
            });
        }
        complete
    }

    /// Metadata write then verification; each step only runs if the previous
    /// one succeeded.
    async fn record_and_verify(&self, mut run: Run<'_>) -> SyncSummary {
        let auditor = self.auditor();
        let counts = match auditor.current_counts().await {
            Ok(c) => c,
            Err(e) => {
                run.fail("table counts", &e);
                return run.finish();
            }
        };
        match auditor.write_sync_metadata(&counts).await {
            Ok(meta) => {
                run.summary.metadata = Some(meta);
                run.advance(SyncStage::MetadataWritten);
            }
            Err(e) => {
                run.fail("sync metadata", &e);
                return run.finish();
            }
        }
        match auditor.verify().await {
            Ok(report) => {
                if !report.is_consistent() {
                    warn!("verification found drift or dangling parents");
                }
                run.summary.verification = Some(report);
                run.advance(SyncStage::Verified);
            }
            Err(e) => run.fail("verify", &e),
        }
        run.finish()
    }
}

fn display_code(code: Option<i64>) -> String {
    code.map_or_else(|| "<no code>".to_string(), |c| c.to_string())
}
