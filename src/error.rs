//! Export pipeline error taxonomy
//!
//! The classification drives the broker contract: poison errors are
//! acknowledged so the broker never redrives them, everything else leaves the
//! message in flight for redrive after the visibility timeout.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// The message could not be parsed into a valid export job.
    #[error("invalid export message: {0}")]
    InvalidMessage(String),

    /// No builder is registered for the job's (module, type, subType).
    #[error("unsupported report: module={module} type={report_type} subType={sub_type}")]
    UnsupportedReport {
        module: String,
        report_type: String,
        sub_type: String,
    },

    /// An analytics call failed at the transport or decode layer.
    #[error("upstream analytics call failed: {0}")]
    Upstream(String),

    /// Object storage read failed.
    #[error("storage read failed for {key}: {message}")]
    StorageRead { key: String, message: String },

    /// Object storage write failed.
    #[error("storage write failed for {key}: {message}")]
    StorageWrite { key: String, message: String },

    /// Workbook bytes could not be encoded or re-read.
    #[error("workbook codec error: {0}")]
    Workbook(String),

    /// The job's cancellation signal fired (shutdown or visibility deadline).
    #[error("export cancelled: {0}")]
    Cancelled(String),
}

impl ExportError {
    /// Poison messages are acknowledged without redrive; a retry can never
    /// succeed for them.
    pub fn is_poison(&self) -> bool {
        matches!(
            self,
            ExportError::InvalidMessage(_) | ExportError::UnsupportedReport { .. }
        )
    }
}
