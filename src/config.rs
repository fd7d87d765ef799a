use std::time::Duration;

use serde::Serialize;

use crate::error::{SyncError, SyncResult};
use crate::util::env::{env_opt, env_parse_strict};
use crate::util::retry::RetryPolicy;

pub const DEFAULT_API_BASE_URL: &str = "https://provinces.open-api.vn/api";

/// Districts holding fewer wards than this are treated as "not yet synced".
/// Tiny real districts are a known false positive of this heuristic.
pub const DEFAULT_WARD_THRESHOLD: u32 = 3;

pub const DEFAULT_METADATA_KEY: &str = "location_data";

/// Province codes of the centrally governed cities: Hà Nội, Hải Phòng,
/// Đà Nẵng, Hồ Chí Minh, Cần Thơ.
pub const MAJOR_CITY_CODES: [i64; 5] = [1, 31, 48, 79, 92];

/// Which provinces get their wards fetched during a full run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WardScope {
    #[default]
    All,
    MajorCitiesOnly,
}

impl WardScope {
    pub fn includes(&self, province_code: i64) -> bool {
        match self {
            Self::All => true,
            Self::MajorCitiesOnly => MAJOR_CITY_CODES.contains(&province_code),
        }
    }
}

impl std::str::FromStr for WardScope {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "all" => Ok(Self::All),
            "major-cities-only" | "major-cities" => Ok(Self::MajorCitiesOnly),
            other => Err(SyncError::Configuration(format!(
                "unknown ward scope {other:?} (expected all | major-cities-only)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    /// Fixed pause after every upstream call.
    pub request_delay: Duration,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
    pub province_batch_size: usize,
    pub district_batch_size: usize,
    pub ward_batch_size: usize,
    pub ward_threshold: u32,
    pub ward_scope: WardScope,
    pub metadata_key: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_delay: Duration::from_millis(200),
            retry: RetryPolicy::default(),
            http_timeout: Duration::from_secs(30),
            province_batch_size: 100,
            district_batch_size: 50,
            ward_batch_size: 100,
            ward_threshold: DEFAULT_WARD_THRESHOLD,
            ward_scope: WardScope::All,
            metadata_key: DEFAULT_METADATA_KEY.to_string(),
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with `GEO_SYNC_*` environment variables. A value
    /// that is set but does not parse is a configuration error.
    pub fn from_env() -> SyncResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = env_opt("GEO_SYNC_API_BASE_URL") {
            cfg.api_base_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Some(ms) = env_parse_strict::<u64>("GEO_SYNC_REQUEST_DELAY_MS")? {
            cfg.request_delay = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse_strict::<u32>("GEO_SYNC_MAX_ATTEMPTS")? {
            cfg.retry.max_attempts = n;
        }
        if let Some(ms) = env_parse_strict::<u64>("GEO_SYNC_BACKOFF_MS")? {
            cfg.retry.backoff_ms = ms;
        }
        if let Some(secs) = env_parse_strict::<u64>("GEO_SYNC_HTTP_TIMEOUT_SECS")? {
            cfg.http_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse_strict::<usize>("GEO_SYNC_PROVINCE_BATCH")? {
            cfg.province_batch_size = n;
        }
        if let Some(n) = env_parse_strict::<usize>("GEO_SYNC_DISTRICT_BATCH")? {
            cfg.district_batch_size = n;
        }
        if let Some(n) = env_parse_strict::<usize>("GEO_SYNC_WARD_BATCH")? {
            cfg.ward_batch_size = n;
        }
        if let Some(n) = env_parse_strict::<u32>("GEO_SYNC_WARD_THRESHOLD")? {
            cfg.ward_threshold = n;
        }
        if let Some(scope) = env_parse_strict::<WardScope>("GEO_SYNC_WARD_SCOPE")? {
            cfg.ward_scope = scope;
        }
        if let Some(key) = env_opt("GEO_SYNC_METADATA_KEY") {
            cfg.metadata_key = key.trim().to_string();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.api_base_url.is_empty() {
            return Err(SyncError::Configuration("API base URL is empty".into()));
        }
        if self.province_batch_size == 0 || self.district_batch_size == 0 || self.ward_batch_size == 0
        {
            return Err(SyncError::Configuration(
                "batch sizes must be greater than zero".into(),
            ));
        }
        if self.metadata_key.is_empty() {
            return Err(SyncError::Configuration("metadata key is empty".into()));
        }
        Ok(())
    }
}
