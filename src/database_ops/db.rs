use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Row,
};
use tracing::{info, instrument, warn};

use crate::util::env::env_flag;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options =
            PgConnectOptions::from_str(database_url).context("invalid database URL")?;

        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !env_flag("USE_PREPARED", false) {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await
            .context("connecting to postgres")?;
        info!(max_connections, "connected to db");

        // Off unless AUTO_MIGRATE is set.
        if env_flag("AUTO_MIGRATE", false) {
            info!("running migrations (AUTO_MIGRATE=on)");
            Self::run_migrations(&pool).await?;
        } else {
            info!("AUTO_MIGRATE disabled; skipping migrations");
        }
        Ok(Self { pool })
    }

    /// Applies `./migrations/NNNN_description.sql` files not yet recorded in
    /// `_geo_sync_migrations`, in version order.
    async fn run_migrations(pool: &PgPool) -> Result<()> {
        use std::collections::HashSet;
        use std::{fs, path::Path};

        let dir = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations"));
        if !dir.exists() {
            warn!(dir = %dir.display(), "migrations directory missing");
            return Ok(());
        }
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _geo_sync_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT,
                installed_at TIMESTAMPTZ DEFAULT now()
             )",
        )
        .execute(pool)
        .await?;

        let mut applied: HashSet<i64> = HashSet::new();
        for r in sqlx::raw_sql("SELECT version FROM _geo_sync_migrations")
            .fetch_all(pool)
            .await?
        {
            applied.insert(r.try_get::<i64, _>(0)?);
        }

        let mut candidates: Vec<(i64, String, std::path::PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some((version, desc)) = parse_migration_name(fname) {
                candidates.push((version, desc, path.clone()));
            }
        }
        candidates.sort_by_key(|(v, _, _)| *v);

        for (version, desc, path) in candidates {
            if applied.contains(&version) {
                continue;
            }
            let sql = fs::read_to_string(&path)?;
            info!(version, file = ?path, "applying migration");
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(&sql).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO _geo_sync_migrations(version, description) VALUES ($1, $2)")
                .bind(version)
                .bind(&desc)
                .persistent(false)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            applied.insert(version);
        }
        Ok(())
    }
}

/// `0001_location_tables.sql` → `(1, "location_tables")`; anything else is skipped.
fn parse_migration_name(fname: &str) -> Option<(i64, String)> {
    let stem = fname.strip_suffix(".sql")?;
    let (num, desc) = stem.split_once('_')?;
    if num.is_empty() || !num.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((num.parse().ok()?, desc.to_string()))
}
