//! Supported providers and the normalized item shape.
//!
//! Each provider lives in its own module as a static [`ProviderDescriptor`]
//! plus the function that maps its raw records to [`IntegrationItem`].

mod airtable;
mod hubspot;
mod notion;

pub use airtable::AIRTABLE;
pub use hubspot::HUBSPOT;
pub use notion::NOTION;

use crate::oauth::ProviderDescriptor;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every provider this build knows about.
pub static PROVIDERS: &[&ProviderDescriptor] = &[&HUBSPOT, &NOTION, &AIRTABLE];

/// Look up a provider descriptor by its route name.
pub fn descriptor(name: &str) -> Option<&'static ProviderDescriptor> {
    PROVIDERS.iter().copied().find(|d| d.name == name)
}

/// A provider resource in the common shape returned by `/load`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrationItem {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub name: Option<String>,
    pub parent_id: Option<String>,
    pub parent_path_or_name: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub delta: Option<String>,
    pub drive_id: Option<String>,
    pub directory: bool,
    pub visibility: bool,
    pub children: Vec<String>,
}

impl Default for IntegrationItem {
    fn default() -> Self {
        Self {
            id: None,
            item_type: None,
            name: None,
            parent_id: None,
            parent_path_or_name: None,
            creation_time: None,
            last_modified_time: None,
            url: None,
            mime_type: None,
            delta: None,
            drive_id: None,
            directory: false,
            visibility: true,
            children: Vec::new(),
        }
    }
}

/// String field, also accepting numeric ids.
pub(crate) fn string_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// RFC 3339 string or epoch milliseconds.
pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}
