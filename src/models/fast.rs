use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FAST_URI_PREFIX: &str = "https://id.worldcat.org/fast/";

/// OCLC FAST geographic heading (`gazetteer_fast`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FastEntry {
    pub fast_id: String,
    pub uri: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub entry_type: String,
    pub label: String,
    pub geoname_id: Option<String>,
    pub viaf_id: Option<String>,
    pub wikipedia_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FastEntry {
    pub fn uri_for(fast_id: &str) -> String {
        format!("{}{}", FAST_URI_PREFIX, fast_id)
    }
}
