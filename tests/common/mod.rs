#![allow(dead_code)]

pub mod memory;
pub mod upstream;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use geo_sync::database_ops::locations::progress::{ProgressReporter, SyncEvent};
use geo_sync::database_ops::locations::LocationSync;
use geo_sync::util::retry::RetryPolicy;
use geo_sync::SyncConfig;

pub use memory::MemoryStore;
pub use upstream::FakeUpstream;

/// Defaults with pacing and backoff switched off.
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        request_delay: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_ms: 0,
        },
        ..SyncConfig::default()
    }
}

pub fn sync_with(
    upstream: &FakeUpstream,
    store: &MemoryStore,
    cfg: SyncConfig,
) -> LocationSync<FakeUpstream, MemoryStore> {
    LocationSync::new(upstream.clone(), store.clone(), cfg)
        .with_reporter(geo_sync::database_ops::locations::progress::SilentReporter)
}

/// Keeps every event for later assertions.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    pub events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: &SyncEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// httpmock needs a loopback listener. Without one the HTTP tests fail
/// unless `GEO_SYNC_SKIP_HTTP_TESTS=1` opts out of them explicitly.
pub fn loopback_available() -> bool {
    if std::net::TcpListener::bind("127.0.0.1:0").is_ok() {
        return true;
    }
    if std::env::var("GEO_SYNC_SKIP_HTTP_TESTS").is_ok_and(|v| v.trim() == "1") {
        eprintln!("Skipping httpmock tests: loopback unavailable, GEO_SYNC_SKIP_HTTP_TESTS=1");
        return false;
    }
    panic!("cannot bind 127.0.0.1; set GEO_SYNC_SKIP_HTTP_TESTS=1 to skip the HTTP client tests");
}
