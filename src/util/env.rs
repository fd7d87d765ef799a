//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};

static INIT: Once = Once::new();

/// Load .env exactly once. Falls back to the crate root when the working
/// directory has none. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
        let _ = dotenv::from_filename(candidate);
    });
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parsed value that refuses garbage: unset/empty is `Ok(None)`, an
/// unparseable value is a configuration error naming the key.
pub fn env_parse_strict<T>(key: &str) -> SyncResult<Option<T>>
where
    T: FromStr,
{
    match env_opt(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SyncError::Configuration(format!("invalid value for {key}: {raw:?}"))),
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Composed database URL (tries specific -> generic). Returns first found.
pub fn db_url() -> SyncResult<String> {
    init_env();
    for k in [
        "SUPABASE_DB_URL",
        "SUPABASE_DB_SESSION_URL",
        "DATABASE_URL",
        "DB_URL",
    ] {
        if let Some(v) = env_opt(k) {
            info!(target = "env", source = k, "database URL resolved");
            return Ok(v.trim().to_string());
        }
    }

    if let Some(dsn) = build_dsn_from_laravel_vars() {
        info!(target = "env", "database URL composed from DB_* variables");
        return Ok(dsn);
    }

    warn!(target = "env", "no database URL env vars set");
    Err(SyncError::Configuration(
        "no database URL configured; set SUPABASE_DB_URL, DATABASE_URL or DB_HOST/DB_USERNAME"
            .to_string(),
    ))
}

fn build_dsn_from_laravel_vars() -> Option<String> {
    let host = env_opt("DB_HOST")?;
    let user = env_opt("DB_USERNAME")?;
    let password = env_opt("DB_PASSWORD");
    let database = env_opt("DB_DATABASE").unwrap_or_else(|| "postgres".into());
    let port: u16 = env_parse("DB_PORT", 5432u16);
    let ssl_mode = env_opt("DB_SSLMODE").unwrap_or_else(|| "prefer".into());
    compose_dsn(&host, port, &user, password.as_deref(), &database, &ssl_mode)
}

/// Build a postgres DSN through `url::Url` so reserved characters in the
/// credentials are percent-encoded.
fn compose_dsn(
    host: &str,
    port: u16,
    user: &str,
    password: Option<&str>,
    database: &str,
    ssl_mode: &str,
) -> Option<String> {
    let mut out = url::Url::parse("postgresql://localhost").ok()?;
    out.set_username(user).ok()?;
    if let Some(pass) = password {
        out.set_password(Some(pass)).ok()?;
    }

    let host_trimmed = host.trim().trim_matches(|c| c == '[' || c == ']');
    if host_trimmed.contains(':') {
        out.set_host(Some(&format!("[{host_trimmed}]"))).ok()?;
    } else {
        out.set_host(Some(host_trimmed)).ok()?;
    }

    out.set_port(Some(port)).ok()?;
    out.set_path(&format!("/{database}"));
    if ssl_mode != "disable" {
        out.query_pairs_mut().append_pair("sslmode", ssl_mode);
    }
    Some(out.to_string())
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD") || k.contains("SECRET") || k.contains("KEY") || k.contains("TOKEN")
    {
        return "***".to_string();
    }

    let val_trim = val.trim();

    // Postgres DSNs carry credentials even when the key name looks harmless.
    if let Ok(mut u) = url::Url::parse(val_trim) {
        let scheme = u.scheme().to_ascii_lowercase();
        if scheme == "postgres" || scheme == "postgresql" {
            let _ = u.set_username("***");
            let _ = u.set_password(Some("***"));
            return u.to_string();
        }
    }

    val_trim.to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns a configuration error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> SyncResult<()> {
    init_env();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = also_log
        .iter()
        .map(|&k| (k.to_string(), redact_value(k, &env_opt(k).unwrap_or_default())))
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(SyncError::Configuration(format!(
            "missing required env: {missing:?}"
        )));
    }
    Ok(())
}
