//! Sensor report payload carried by `report_all`.
//!
//! The firmware writes its JSON document without escaping, so the commas in it
//! arrive as field separators. Re-joining the fields with `,` restores the
//! document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::FIELD_SEPARATOR;
use crate::errors::{DriverError, Result};
use crate::offsets::{OffsetLayout, OffsetRecord};

/// Parsed `report_all` document. Keys the firmware omits stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorReport {
    pub device_id: Option<String>,
    pub version: Option<String>,
    pub message: Option<String>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub eco2: Option<i64>,
    pub eco2_avg: Option<i64>,
    pub pm25: Option<i64>,
    pub pm25_avg: Option<i64>,
    pub alerting: Option<bool>,
    pub alert_enabled: Option<bool>,
    pub eco2_alert_level: Option<i64>,
    pub pm25_alert_level: Option<i64>,
    pub offsets: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SensorReport {
    /// Rebuild and parse the JSON document from `report_all` fields.
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self> {
        let separator = (FIELD_SEPARATOR as char).to_string();
        let document = fields
            .iter()
            .map(|f| f.as_ref())
            .collect::<Vec<_>>()
            .join(&separator);
        serde_json::from_str(&document)
            .map_err(|e| DriverError::Report(format!("invalid report JSON: {e}")))
    }

    /// Offsets currently stored on the device, if the report carries them.
    pub fn stored_offsets(&self) -> Option<Result<OffsetRecord>> {
        self.offsets
            .as_deref()
            .map(|raw| OffsetLayout::REPORT.decode(raw))
    }
}
