use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::util::retry::{with_retry, RetryPolicy};

use super::models::{DistrictDetail, ProvinceDetail, ProvinceRecord};

/// Read-only view of the upstream administrative-division API.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn fetch_province_list(&self) -> SyncResult<Vec<ProvinceRecord>>;
    async fn fetch_province_detail(&self, province_code: i64) -> SyncResult<ProvinceDetail>;
    async fn fetch_district_detail(&self, district_code: i64) -> SyncResult<DistrictDetail>;
}

/// reqwest client for `provinces.open-api.vn` style endpoints.
#[derive(Debug, Clone)]
pub struct OpenApiClient {
    base_url: String,
    retry: RetryPolicy,
    http: Client,
}

impl OpenApiClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> SyncResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("geo-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            http,
        })
    }

    pub fn from_config(cfg: &SyncConfig) -> SyncResult<Self> {
        Self::new(&cfg.api_base_url, cfg.http_timeout, cfg.retry)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SyncResult<T> {
        with_retry(self.retry, url, |attempt| async move {
            let resp = self
                .http
                .get(url)
                .header(header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| SyncError::UpstreamUnavailable {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            let status = resp.status();
            debug!(url, attempt, status = status.as_u16(), "upstream response");
            if !status.is_success() {
                return Err(SyncError::UpstreamUnavailable {
                    url: url.to_string(),
                    message: format!("HTTP {status}"),
                });
            }
            let body = resp
                .bytes()
                .await
                .map_err(|e| SyncError::UpstreamUnavailable {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            serde_json::from_slice::<T>(&body).map_err(|e| SyncError::UpstreamBadResponse {
                url: url.to_string(),
                message: e.to_string(),
            })
        })
        .await
    }
}

#[async_trait]
impl LocationSource for OpenApiClient {
    #[instrument(skip(self))]
    async fn fetch_province_list(&self) -> SyncResult<Vec<ProvinceRecord>> {
        let url = format!("{}/p/", self.base_url);
        self.get_json(&url).await
    }

    #[instrument(skip(self))]
    async fn fetch_province_detail(&self, province_code: i64) -> SyncResult<ProvinceDetail> {
        let url = format!("{}/p/{}?depth=2", self.base_url, province_code);
        self.get_json(&url).await
    }

    #[instrument(skip(self))]
    async fn fetch_district_detail(&self, district_code: i64) -> SyncResult<DistrictDetail> {
        let url = format!("{}/d/{}?depth=2", self.base_url, district_code);
        self.get_json(&url).await
    }
}
