use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{SyncConfig, WardScope};
use crate::database_ops::db::Db;
use crate::database_ops::locations::{LocationSync, OpenApiClient};
use crate::error::{SyncError, SyncResult};
use crate::util::env as env_util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationCommand {
    Full,
    Provinces,
    Verify,
    SyncRemaining,
    /// Read-only coverage dump.
    Coverage,
}

#[derive(Debug, Clone, Default)]
pub struct LocationSyncConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
    pub api_base_url: Option<String>,
    pub ward_scope: Option<WardScope>,
    pub request_delay_ms: Option<u64>,
    pub ward_threshold: Option<u32>,
    pub max_connections: Option<u32>,
}

const LOGGED_KEYS: &[&str] = &[
    "SUPABASE_DB_URL",
    "DATABASE_URL",
    "GEO_SYNC_API_BASE_URL",
    "GEO_SYNC_REQUEST_DELAY_MS",
    "GEO_SYNC_WARD_SCOPE",
    "GEO_SYNC_WARD_THRESHOLD",
    "AUTO_MIGRATE",
];

/// Environment defaults with command-line overrides applied on top.
pub fn resolve_sync_config(cfg: &LocationSyncConfig) -> SyncResult<SyncConfig> {
    let mut sync = SyncConfig::from_env()?;
    if let Some(url) = &cfg.api_base_url {
        sync.api_base_url = url.trim().trim_end_matches('/').to_string();
    }
    if let Some(scope) = cfg.ward_scope {
        sync.ward_scope = scope;
    }
    if let Some(ms) = cfg.request_delay_ms {
        sync.request_delay = std::time::Duration::from_millis(ms);
    }
    if let Some(threshold) = cfg.ward_threshold {
        sync.ward_threshold = threshold;
    }
    sync.validate()?;
    Ok(sync)
}

/// Runs one command and prints its JSON result on stdout. Returns `Ok(true)`
/// when the run reached the verified stage; configuration problems are
/// returned as errors before anything touches the network.
pub async fn run(command: LocationCommand, cfg: LocationSyncConfig) -> Result<bool> {
    env_util::init_env();
    env_util::preflight_check("geo-sync", &[], LOGGED_KEYS)?;

    let sync_cfg = resolve_sync_config(&cfg)?;
    let database_url = match cfg.database_url.clone() {
        Some(url) if !url.trim().is_empty() => url,
        Some(_) => {
            return Err(SyncError::Configuration("--db-url is empty".into()).into());
        }
        None => env_util::db_url()?,
    };
    let db = Db::connect(&database_url, cfg.max_connections.unwrap_or(5))
        .await
        .context("Db::connect failed")?;
    let client = OpenApiClient::from_config(&sync_cfg)?;
    info!(
        command = ?command,
        api = client.base_url(),
        scope = ?sync_cfg.ward_scope,
        "geo-sync starting"
    );
    let sync = LocationSync::new(client, db, sync_cfg);

    let summary = match command {
        LocationCommand::Full => sync.run_full().await,
        LocationCommand::Provinces => sync.run_provinces().await,
        LocationCommand::Verify => sync.run_verify().await,
        LocationCommand::SyncRemaining => sync.run_sync_remaining().await,
        LocationCommand::Coverage => {
            let auditor = sync.auditor();
            let coverage = auditor.compute_district_coverage().await?;
            let scope = sync.config().ward_scope;
            let (needing, out_of_scope): (Vec<_>, Vec<_>) = auditor
                .list_districts_needing_wards()
                .await?
                .into_iter()
                .partition(|d| scope.includes(d.province_code));
            let out = json!({
                "ward_threshold": sync.config().ward_threshold,
                "ward_scope": scope,
                "coverage": coverage,
                "districts_needing_wards": needing,
                "out_of_scope_districts": out_of_scope,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(true);
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.errors.is_empty() {
        warn!(
            errors = summary.errors.len(),
            "run finished with recorded errors; `sync-remaining` can heal ward gaps"
        );
    }
    Ok(summary.reached_verified())
}
