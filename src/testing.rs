//! Record builders shared by unit tests.

use chrono::{TimeZone, Utc};

use crate::models::{BtaaRegion, GeonamesRecord};

pub(crate) fn stamp() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub(crate) fn geonames_record(geonameid: i64, name: &str, population: Option<i64>) -> GeonamesRecord {
    GeonamesRecord {
        geonameid,
        name: name.to_string(),
        asciiname: name.to_string(),
        alternatenames: None,
        latitude: Some(44.98),
        longitude: Some(-93.26),
        feature_class: Some("P".to_string()),
        feature_code: Some("PPL".to_string()),
        country_code: Some("US".to_string()),
        cc2: None,
        admin1_code: Some("MN".to_string()),
        admin2_code: None,
        admin3_code: None,
        admin4_code: None,
        population,
        elevation: None,
        dem: None,
        timezone: Some("America/Chicago".to_string()),
        modification_date: None,
        created_at: stamp(),
        updated_at: stamp(),
    }
}

pub(crate) fn btaa_region(fast_area: &str, state_abbv: &str) -> BtaaRegion {
    BtaaRegion {
        id: None,
        fast_area: fast_area.to_string(),
        bounding_box: None,
        geometry: None,
        geonames_id: None,
        state_abbv: Some(state_abbv.to_string()),
        state_name: None,
        county_fips: None,
        statefp: None,
        namelsad: None,
        created_at: stamp(),
        updated_at: stamp(),
    }
}
