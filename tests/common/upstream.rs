//! Scripted `LocationSource` built from plain tuples.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use geo_sync::database_ops::locations::models::{
    DistrictDetail, DistrictRecord, ProvinceDetail, ProvinceRecord, WardRecord,
};
use geo_sync::database_ops::locations::LocationSource;
use geo_sync::{SyncError, SyncResult};

#[derive(Default)]
struct Inner {
    provinces: Vec<ProvinceRecord>,
    districts: HashMap<i64, Vec<DistrictRecord>>,
    wards: HashMap<i64, Vec<WardRecord>>,
    failing_provinces: HashSet<i64>,
    failing_districts: HashSet<i64>,
    province_list_down: bool,
    province_fetches: Vec<i64>,
    district_fetches: Vec<i64>,
}

#[derive(Clone, Default)]
pub struct FakeUpstream {
    inner: Arc<Mutex<Inner>>,
}

pub fn province(code: i64) -> ProvinceRecord {
    ProvinceRecord {
        code: Some(code),
        name: Some(format!("Tỉnh {code}")),
        codename: Some(format!("tinh_{code}")),
        division_type: Some("tỉnh".into()),
        phone_code: Some(200 + code),
    }
}

pub fn district(code: i64) -> DistrictRecord {
    DistrictRecord {
        code: Some(code),
        name: Some(format!("Huyện {code}")),
        codename: Some(format!("huyen_{code}")),
        division_type: Some("huyện".into()),
        short_codename: Some(format!("{code}")),
        province_code: None,
    }
}

pub fn ward(code: i64) -> WardRecord {
    WardRecord {
        code: Some(code),
        name: Some(format!("Xã {code}")),
        codename: Some(format!("xa_{code}")),
        division_type: Some("xã".into()),
        short_codename: None,
        district_code: None,
    }
}

#[allow(dead_code)]
impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_province(self, code: i64, district_codes: &[i64]) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.provinces.push(province(code));
            inner
                .districts
                .insert(code, district_codes.iter().map(|&c| district(c)).collect());
        }
        self
    }

    pub fn with_wards(self, district_code: i64, ward_codes: impl IntoIterator<Item = i64>) -> Self {
        self.set_wards(district_code, ward_codes.into_iter().map(ward).collect());
        self
    }

    pub fn set_wards(&self, district_code: i64, wards: Vec<WardRecord>) {
        self.inner.lock().unwrap().wards.insert(district_code, wards);
    }

    pub fn push_raw_province(&self, record: ProvinceRecord) {
        self.inner.lock().unwrap().provinces.push(record);
    }

    pub fn fail_province(&self, code: i64) {
        self.inner.lock().unwrap().failing_provinces.insert(code);
    }

    pub fn fail_district(&self, code: i64) {
        self.inner.lock().unwrap().failing_districts.insert(code);
    }

    pub fn heal_district(&self, code: i64) {
        self.inner.lock().unwrap().failing_districts.remove(&code);
    }

    pub fn take_down_province_list(&self) {
        self.inner.lock().unwrap().province_list_down = true;
    }

    /// Province codes requested via `fetch_province_detail`, in order.
    pub fn province_fetches(&self) -> Vec<i64> {
        self.inner.lock().unwrap().province_fetches.clone()
    }

    /// District codes requested via `fetch_district_detail`, in order.
    pub fn district_fetches(&self) -> Vec<i64> {
        self.inner.lock().unwrap().district_fetches.clone()
    }
}

fn unavailable(url: String) -> SyncError {
    SyncError::UpstreamUnavailable {
        url,
        message: "HTTP 502 Bad Gateway".into(),
    }
}

#[async_trait]
impl LocationSource for FakeUpstream {
    async fn fetch_province_list(&self) -> SyncResult<Vec<ProvinceRecord>> {
        let inner = self.inner.lock().unwrap();
        if inner.province_list_down {
            return Err(unavailable("fake://p/".into()));
        }
        Ok(inner.provinces.clone())
    }

    async fn fetch_province_detail(&self, province_code: i64) -> SyncResult<ProvinceDetail> {
        let mut inner = self.inner.lock().unwrap();
        inner.province_fetches.push(province_code);
        if inner.failing_provinces.contains(&province_code) {
            return Err(unavailable(format!("fake://p/{province_code}")));
        }
        Ok(ProvinceDetail {
            code: Some(province_code),
            name: None,
            districts: inner
                .districts
                .get(&province_code)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn fetch_district_detail(&self, district_code: i64) -> SyncResult<DistrictDetail> {
        let mut inner = self.inner.lock().unwrap();
        inner.district_fetches.push(district_code);
        if inner.failing_districts.contains(&district_code) {
            return Err(unavailable(format!("fake://d/{district_code}")));
        }
        Ok(DistrictDetail {
            code: Some(district_code),
            name: None,
            wards: inner.wards.get(&district_code).cloned().unwrap_or_default(),
        })
    }
}
