//! Export job types
//!
//! An `ExportJob` is the unit of work: one queued request to produce one
//! report artifact. It is materialized from a broker message, immutable after
//! parse, and discarded when the job terminates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Delivery mode requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    Download,
    Email,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Download => "download",
            ExportMode::Email => "email",
        }
    }
}

/// Product module the report is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportModule {
    #[serde(rename = "insights")]
    Insights,
    #[serde(rename = "usageLogs")]
    UsageLogs,
}

impl ExportModule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportModule::Insights => "insights",
            ExportModule::UsageLogs => "usageLogs",
        }
    }
}

/// A single filter condition. `data` is opaque to everything except the
/// dedicated parsers in `reports::filters` (multi-value selections and ranges
/// use the `#@#` delimiter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub data: String,
    pub operation: String,
}

/// An ordered mapping from field path to condition, plus a regex string,
/// forwarded verbatim to the analytics services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSet {
    pub conditions: BTreeMap<String, FilterCondition>,
    #[serde(default)]
    pub regex: String,
}

impl FilterSet {
    /// Look up a condition by field path.
    pub fn condition(&self, field: &str) -> Option<&FilterCondition> {
        self.conditions.get(field)
    }
}

/// One queued export request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    #[serde(rename = "eventId")]
    pub event_id: String,
    pub mode: ExportMode,
    pub module: ExportModule,
    #[serde(rename = "type")]
    pub report_type: String,
    #[serde(rename = "subType", default)]
    pub sub_type: String,
    #[serde(rename = "user_id", alias = "userId")]
    pub user_id: i64,
    #[serde(rename = "clientId")]
    pub client_id: i64,
    #[serde(rename = "productId", default)]
    pub product_id: i64,
    #[serde(default)]
    pub filter: Option<FilterSet>,
    #[serde(rename = "pageFilter", default)]
    pub page_filter: Option<FilterSet>,
}

/// Fields that must be present and non-null before a message is handed to the
/// router. A message missing any of them is poison: acknowledged and dropped.
pub const REQUIRED_JOB_FIELDS: [&str; 6] =
    ["eventId", "clientId", "user_id", "module", "type", "mode"];
