//! Report audit log datastore
//!
//! One durable row per job in the `report_audit_log` collection, keyed by
//! `(event_id, client_id)`. The row is created by the upstream producer; this
//! worker only moves it through PROCESSING into SUCCESS or FAILED.

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::{Collection, Database};
use tracing::{error, info, warn};

use crate::types::{AuditRow, ExportStatus};

const AUDIT_COLLECTION: &str = "report_audit_log";

/// Optional fields attached to a status transition.
#[derive(Debug, Clone, Default)]
pub struct AuditUpdate {
    pub total_time: Option<i64>,
    pub s3_bucket: Option<String>,
    pub download_url: Option<String>,
}

/// Seam between the router and the document store. The implementation must
/// swallow its own failures: a missed audit write degrades the trail, it does
/// not fail the job.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Transition the job's audit row. Returns whether exactly one row was
    /// modified.
    async fn update_status(
        &self,
        event_id: &str,
        client_id: i64,
        status: ExportStatus,
        update: AuditUpdate,
    ) -> bool;
}

/// Build the `$set` document for a transition.
fn status_update_doc(status: ExportStatus, update: &AuditUpdate) -> Document {
    let mut set = doc! {
        "status": status.as_str(),
        "updated_at": mongodb::bson::DateTime::now(),
    };
    if let Some(total_time) = update.total_time {
        set.insert("total_time", total_time);
    }
    if let Some(bucket) = &update.s3_bucket {
        set.insert("s3_bucket", bucket.as_str());
    }
    if let Some(url) = &update.download_url {
        set.insert("download_url", url.as_str());
    }
    set
}

pub struct MongoAuditStore {
    collection: Collection<Document>,
    rows: Collection<AuditRow>,
}

impl MongoAuditStore {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(AUDIT_COLLECTION),
            rows: database.collection(AUDIT_COLLECTION),
        }
    }

    /// Operational read-back of a job's audit row.
    #[allow(dead_code)]
    pub async fn find_by_event_id(&self, event_id: &str, client_id: i64) -> Option<AuditRow> {
        match self
            .rows
            .find_one(doc! {"event_id": event_id, "client_id": client_id})
            .await
        {
            Ok(row) => row,
            Err(e) => {
                error!("Failed to read audit row for event {}: {}", event_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl AuditLog for MongoAuditStore {
    async fn update_status(
        &self,
        event_id: &str,
        client_id: i64,
        status: ExportStatus,
        update: AuditUpdate,
    ) -> bool {
        debug_assert!(status.writable_by_worker());
        info!(
            "Updating audit log to {} for event {}",
            status.as_str(),
            event_id
        );

        let filter = doc! {"event_id": event_id, "client_id": client_id};
        let set = status_update_doc(status, &update);

        match self.collection.update_one(filter, doc! {"$set": set}).await {
            Ok(result) => {
                if result.modified_count == 0 {
                    warn!(
                        "No audit row matched event {} (client {}) for status {}",
                        event_id,
                        client_id,
                        status.as_str()
                    );
                }
                result.modified_count > 0
            }
            Err(e) => {
                error!("Audit update failed for event {}: {}", event_id, e);
                false
            }
        }
    }
}
