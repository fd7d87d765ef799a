//! Upstream record → persistence row mapping. Pure, no I/O.

use crate::error::{SyncError, SyncResult};

use super::models::{
    DistrictRecord, DistrictRow, ProvinceRecord, ProvinceRow, WardRecord, WardRow,
};

fn required_str(value: &Option<String>, entity: &'static str, field: &'static str) -> SyncResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(SyncError::MalformedRecord { entity, field }),
    }
}

fn required_code(value: Option<i64>, entity: &'static str) -> SyncResult<i64> {
    value.ok_or(SyncError::MalformedRecord {
        entity,
        field: "code",
    })
}

fn optional_str(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn to_province_row(record: &ProvinceRecord) -> SyncResult<ProvinceRow> {
    const ENTITY: &str = "province";
    Ok(ProvinceRow {
        code: required_code(record.code, ENTITY)?,
        name: required_str(&record.name, ENTITY, "name")?,
        codename: required_str(&record.codename, ENTITY, "codename")?,
        division_type: required_str(&record.division_type, ENTITY, "division_type")?,
        phone_code: record.phone_code,
    })
}

/// The parent code comes from the request that returned the record, not the
/// payload: nested responses do not always repeat it.
pub fn to_district_row(record: &DistrictRecord, province_code: i64) -> SyncResult<DistrictRow> {
    const ENTITY: &str = "district";
    Ok(DistrictRow {
        code: required_code(record.code, ENTITY)?,
        name: required_str(&record.name, ENTITY, "name")?,
        codename: required_str(&record.codename, ENTITY, "codename")?,
        division_type: required_str(&record.division_type, ENTITY, "division_type")?,
        short_codename: optional_str(&record.short_codename),
        province_code,
    })
}

pub fn to_ward_row(record: &WardRecord, district_code: i64) -> SyncResult<WardRow> {
    const ENTITY: &str = "ward";
    Ok(WardRow {
        code: required_code(record.code, ENTITY)?,
        name: required_str(&record.name, ENTITY, "name")?,
        codename: required_str(&record.codename, ENTITY, "codename")?,
        division_type: required_str(&record.division_type, ENTITY, "division_type")?,
        short_codename: optional_str(&record.short_codename),
        district_code,
    })
}
