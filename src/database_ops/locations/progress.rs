use tracing::{info, warn};

use super::sync::SyncStage;

/// One line of progress. The orchestrator emits these; reporters decide how
/// (or whether) they are displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    ProvincesWritten {
        fetched: usize,
        written: usize,
    },
    DistrictsSynced {
        province_code: i64,
        index: usize,
        total: usize,
        fetched: usize,
        written: usize,
    },
    WardsSynced {
        district_code: i64,
        index: usize,
        total: usize,
        fetched: usize,
        written: usize,
    },
    UnitFailed {
        unit: String,
        message: String,
    },
    StageReached(SyncStage),
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &SyncEvent);
}

/// Default reporter: one structured log line per event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: &SyncEvent) {
        match event {
            SyncEvent::ProvincesWritten { fetched, written } => {
                info!(fetched, written, "provinces synced")
            }
            SyncEvent::DistrictsSynced {
                province_code,
                index,
                total,
                fetched,
                written,
            } => info!(
                province_code,
                progress = %format!("{}/{}", index + 1, total),
                fetched,
                written,
                "districts synced"
            ),
            SyncEvent::WardsSynced {
                district_code,
                index,
                total,
                fetched,
                written,
            } => info!(
                district_code,
                progress = %format!("{}/{}", index + 1, total),
                fetched,
                written,
                "wards synced"
            ),
            SyncEvent::UnitFailed { unit, message } => warn!(%unit, %message, "unit failed"),
            SyncEvent::StageReached(stage) => info!(stage = ?stage, "stage reached"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: &SyncEvent) {}
}
