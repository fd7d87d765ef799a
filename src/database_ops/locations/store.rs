use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row};
use tracing::{debug, instrument};

use crate::database_ops::db::Db;
use crate::error::SyncResult;

use super::models::{
    DistrictRow, DistrictWardCount, OrphanCounts, ProvinceRow, SyncMetadata, TableCounts, WardRow,
};

/// Destination-store operations the importer depends on. Each upsert call is
/// one batch: the implementation writes it as a single statement and either
/// all of it lands or none of it does.
#[async_trait]
pub trait LocationStore: Send + Sync {
    async fn upsert_provinces(&self, rows: &[ProvinceRow]) -> SyncResult<u64>;
    async fn upsert_districts(&self, rows: &[DistrictRow]) -> SyncResult<u64>;
    async fn upsert_wards(&self, rows: &[WardRow]) -> SyncResult<u64>;

    async fn table_counts(&self) -> SyncResult<TableCounts>;
    /// Every district with its current ward count (zero included).
    async fn district_ward_counts(&self) -> SyncResult<Vec<DistrictWardCount>>;
    async fn orphan_counts(&self) -> SyncResult<OrphanCounts>;

    async fn read_metadata(&self, cache_key: &str) -> SyncResult<Option<SyncMetadata>>;
    async fn write_metadata(&self, metadata: &SyncMetadata) -> SyncResult<()>;
}

/// SQLSTATE `undefined_function`.
const UNDEFINED_FUNCTION: &str = "42883";

fn is_undefined_function(sqlstate: Option<&str>) -> bool {
    sqlstate == Some(UNDEFINED_FUNCTION)
}

fn is_undefined_function_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => is_undefined_function(db_err.code().as_deref()),
        _ => false,
    }
}

impl Db {
    async fn count_rows(&self, sql: &str) -> SyncResult<i64> {
        let n: i64 = sqlx::query_scalar(sql)
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl LocationStore for Db {
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_provinces(&self, rows: &[ProvinceRow]) -> SyncResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO provinces (code, name, codename, division_type, phone_code) ",
        );
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.code)
                .push_bind(&r.name)
                .push_bind(&r.codename)
                .push_bind(&r.division_type)
                .push_bind(r.phone_code);
        });
        qb.push(
            " ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name,
                codename = EXCLUDED.codename,
                division_type = EXCLUDED.division_type,
                phone_code = EXCLUDED.phone_code,
                updated_at = now()",
        );
        let res = qb.build().persistent(false).execute(&self.pool).await?;
        debug!(affected = res.rows_affected(), "provinces upserted");
        Ok(res.rows_affected())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_districts(&self, rows: &[DistrictRow]) -> SyncResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO districts (code, name, codename, division_type, short_codename, province_code) ",
        );
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.code)
                .push_bind(&r.name)
                .push_bind(&r.codename)
                .push_bind(&r.division_type)
                .push_bind(r.short_codename.as_ref())
                .push_bind(r.province_code);
        });
        qb.push(
            " ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name,
                codename = EXCLUDED.codename,
                division_type = EXCLUDED.division_type,
                short_codename = EXCLUDED.short_codename,
                province_code = EXCLUDED.province_code,
                updated_at = now()",
        );
        let res = qb.build().persistent(false).execute(&self.pool).await?;
        debug!(affected = res.rows_affected(), "districts upserted");
        Ok(res.rows_affected())
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn upsert_wards(&self, rows: &[WardRow]) -> SyncResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO wards (code, name, codename, division_type, short_codename, district_code) ",
        );
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.code)
                .push_bind(&r.name)
                .push_bind(&r.codename)
                .push_bind(&r.division_type)
                .push_bind(r.short_codename.as_ref())
                .push_bind(r.district_code);
        });
        qb.push(
            " ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name,
                codename = EXCLUDED.codename,
                division_type = EXCLUDED.division_type,
                short_codename = EXCLUDED.short_codename,
                district_code = EXCLUDED.district_code,
                updated_at = now()",
        );
        let res = qb.build().persistent(false).execute(&self.pool).await?;
        debug!(affected = res.rows_affected(), "wards upserted");
        Ok(res.rows_affected())
    }

    /// Uses the server-side `location_counts()` aggregate when the schema
    /// provides it, plain COUNT(*) otherwise.
    #[instrument(skip(self))]
    async fn table_counts(&self) -> SyncResult<TableCounts> {
        match sqlx::query(
            "SELECT total_provinces, total_districts, total_wards FROM location_counts()",
        )
        .persistent(false)
        .fetch_one(&self.pool)
        .await
        {
            Ok(row) => {
                return Ok(TableCounts {
                    provinces: row.try_get(0)?,
                    districts: row.try_get(1)?,
                    wards: row.try_get(2)?,
                })
            }
            Err(e) if is_undefined_function_error(&e) => {
                debug!("location_counts() not installed; counting tables directly");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(TableCounts {
            provinces: self.count_rows("SELECT COUNT(*)::BIGINT FROM provinces").await?,
            districts: self.count_rows("SELECT COUNT(*)::BIGINT FROM districts").await?,
            wards: self.count_rows("SELECT COUNT(*)::BIGINT FROM wards").await?,
        })
    }

    #[instrument(skip(self))]
    async fn district_ward_counts(&self) -> SyncResult<Vec<DistrictWardCount>> {
        let rows = sqlx::query(
            r#"
            SELECT d.code, d.name, d.province_code, COUNT(w.code)::BIGINT AS ward_count
            FROM districts d
            LEFT JOIN wards w ON w.district_code = d.code
            GROUP BY d.code, d.name, d.province_code
            ORDER BY d.code
            "#,
        )
        .persistent(false)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(DistrictWardCount {
                code: r.try_get("code")?,
                name: r.try_get("name")?,
                province_code: r.try_get("province_code")?,
                ward_count: r.try_get("ward_count")?,
            });
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn orphan_counts(&self) -> SyncResult<OrphanCounts> {
        Ok(OrphanCounts {
            districts: self
                .count_rows(
                    "SELECT COUNT(*)::BIGINT FROM districts d
                     WHERE NOT EXISTS (SELECT 1 FROM provinces p WHERE p.code = d.province_code)",
                )
                .await?,
            wards: self
                .count_rows(
                    "SELECT COUNT(*)::BIGINT FROM wards w
                     WHERE NOT EXISTS (SELECT 1 FROM districts d WHERE d.code = w.district_code)",
                )
                .await?,
        })
    }

    #[instrument(skip(self))]
    async fn read_metadata(&self, cache_key: &str) -> SyncResult<Option<SyncMetadata>> {
        let row = sqlx::query(
            "SELECT cache_key, total_provinces, total_districts, total_wards, last_updated
             FROM location_sync_metadata WHERE cache_key = $1",
        )
        .bind(cache_key)
        .persistent(false)
        .fetch_optional(&self.pool)
        .await?;
        let Some(r) = row else {
            return Ok(None);
        };
        Ok(Some(SyncMetadata {
            cache_key: r.try_get("cache_key")?,
            total_provinces: r.try_get("total_provinces")?,
            total_districts: r.try_get("total_districts")?,
            total_wards: r.try_get("total_wards")?,
            last_updated: r.try_get::<DateTime<Utc>, _>("last_updated")?,
        }))
    }

    #[instrument(skip(self, metadata), fields(cache_key = %metadata.cache_key))]
    async fn write_metadata(&self, metadata: &SyncMetadata) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO location_sync_metadata
                (cache_key, total_provinces, total_districts, total_wards, last_updated)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (cache_key) DO UPDATE SET
                total_provinces = EXCLUDED.total_provinces,
                total_districts = EXCLUDED.total_districts,
                total_wards = EXCLUDED.total_wards,
                last_updated = EXCLUDED.last_updated",
        )
        .bind(&metadata.cache_key)
        .bind(metadata.total_provinces)
        .bind(metadata.total_districts)
        .bind(metadata.total_wards)
        .bind(metadata.last_updated)
        .persistent(false)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
