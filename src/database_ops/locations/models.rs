use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -------- upstream payloads --------
//
// Every field is optional on the wire; the transform stage decides which
// ones are required so a missing field becomes a typed MalformedRecord
// instead of a whole-payload decode failure.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvinceRecord {
    pub code: Option<i64>,
    pub name: Option<String>,
    pub codename: Option<String>,
    pub division_type: Option<String>,
    pub phone_code: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistrictRecord {
    pub code: Option<i64>,
    pub name: Option<String>,
    pub codename: Option<String>,
    pub division_type: Option<String>,
    pub short_codename: Option<String>,
    pub province_code: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardRecord {
    pub code: Option<i64>,
    pub name: Option<String>,
    pub codename: Option<String>,
    pub division_type: Option<String>,
    pub short_codename: Option<String>,
    pub district_code: Option<i64>,
}

/// `GET /p/{code}?depth=2`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvinceDetail {
    pub code: Option<i64>,
    pub name: Option<String>,
    #[serde(default)]
    pub districts: Vec<DistrictRecord>,
}

/// `GET /d/{code}?depth=2`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistrictDetail {
    pub code: Option<i64>,
    pub name: Option<String>,
    #[serde(default)]
    pub wards: Vec<WardRecord>,
}

// -------- persistence rows --------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvinceRow {
    pub code: i64,
    pub name: String,
    pub codename: String,
    pub division_type: String,
    pub phone_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictRow {
    pub code: i64,
    pub name: String,
    pub codename: String,
    pub division_type: String,
    pub short_codename: Option<String>,
    pub province_code: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardRow {
    pub code: i64,
    pub name: String,
    pub codename: String,
    pub division_type: String,
    pub short_codename: Option<String>,
    pub district_code: i64,
}

/// Rows keyed by the upstream natural code.
pub trait Coded {
    fn code(&self) -> i64;
}

impl Coded for ProvinceRow {
    fn code(&self) -> i64 {
        self.code
    }
}

impl Coded for DistrictRow {
    fn code(&self) -> i64 {
        self.code
    }
}

impl Coded for WardRow {
    fn code(&self) -> i64 {
        self.code
    }
}

// -------- audit / metadata --------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub provinces: i64,
    pub districts: i64,
    pub wards: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanCounts {
    /// Districts whose province_code has no province row.
    pub districts: i64,
    /// Wards whose district_code has no district row.
    pub wards: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictWardCount {
    pub code: i64,
    pub name: String,
    pub province_code: i64,
    pub ward_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub cache_key: String,
    pub total_provinces: i64,
    pub total_districts: i64,
    pub total_wards: i64,
    pub last_updated: DateTime<Utc>,
}

impl SyncMetadata {
    pub fn from_counts(cache_key: &str, counts: &TableCounts, at: DateTime<Utc>) -> Self {
        Self {
            cache_key: cache_key.to_string(),
            total_provinces: counts.provinces,
            total_districts: counts.districts,
            total_wards: counts.wards,
            last_updated: at,
        }
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            provinces: self.total_provinces,
            districts: self.total_districts,
            wards: self.total_wards,
        }
    }
}
