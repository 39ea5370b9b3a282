//! Audit state machine types
//!
//! One audit row exists per job, created by the upstream producer. This
//! worker only transitions it: PENDING|QUEUED -> PROCESSING -> SUCCESS|FAILED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{ExportMode, ExportModule};

/// Lifecycle state of an export job's audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportStatus {
    Pending,
    Queued,
    Processing,
    Success,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "PENDING",
            ExportStatus::Queued => "QUEUED",
            ExportStatus::Processing => "PROCESSING",
            ExportStatus::Success => "SUCCESS",
            ExportStatus::Failed => "FAILED",
        }
    }

    /// Only the upstream producer writes the pre-queue states.
    pub fn writable_by_worker(&self) -> bool {
        !matches!(self, ExportStatus::Pending | ExportStatus::Queued)
    }
}

/// Durable audit record in the `report_audit_log` collection, keyed by
/// `(event_id, client_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub event_id: String,
    pub client_id: i64,
    pub product_id: i64,
    pub user_id: i64,
    pub status: ExportStatus,
    pub mode: ExportMode,
    pub module: ExportModule,
    #[serde(rename = "type")]
    pub report_type: String,
    #[serde(rename = "subType", default)]
    pub sub_type: String,
    #[serde(default)]
    pub total_time: Option<i64>,
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}
