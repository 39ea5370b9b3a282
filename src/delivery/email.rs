//! Email delivery (stub)
//!
//! No mail is sent. The artifact is left (or placed) in object storage and
//! delivery reports success, exactly like the production system this worker
//! replaces. The completion notification for this mode is status-only.
//! Wiring a real transport means implementing the send where `deliver` logs
//! the intent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::delivery::{DeliveryResult, DeliverySink};
use crate::error::ExportError;
use crate::reports::ExportOutput;
use crate::storage::{export_key_for_job, ObjectStorage, XLSX_CONTENT_TYPE};
use crate::types::ExportJob;

pub struct EmailSink {
    store: Arc<dyn ObjectStorage>,
    expiry_hours: u64,
}

impl EmailSink {
    pub fn new(store: Arc<dyn ObjectStorage>, expiry_hours: u64) -> Self {
        Self {
            store,
            expiry_hours,
        }
    }
}

#[async_trait]
impl DeliverySink for EmailSink {
    async fn deliver(
        &self,
        output: ExportOutput,
        job: &ExportJob,
        filename: &str,
    ) -> Result<DeliveryResult, ExportError> {
        let (bucket, key, url) = match output {
            ExportOutput::Artifact(handle) => (handle.bucket, handle.key, handle.presigned_url),
            ExportOutput::Stream(bytes) => {
                let key = export_key_for_job(job, Utc::now());
                self.store.put(&key, bytes, XLSX_CONTENT_TYPE).await?;
                let url = self.store.presign_get(&key, self.expiry_hours).await?;
                (self.store.bucket().to_string(), key, url)
            }
        };

        warn!(
            "Email delivery is a stub; {} for event {} stays download-only",
            filename, job.event_id
        );
        info!("Would email a link for {} to user {}", key, job.user_id);

        Ok(DeliveryResult {
            bucket: Some(bucket),
            key: Some(key),
            download_url: Some(url),
            // status-only: non-download modes never put the URL in the
            // user notification
            notification_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::ArtifactHandle;
    use crate::storage::MemoryObjectStore;
    use crate::types::{ExportMode, ExportModule};

    fn job() -> ExportJob {
        ExportJob {
            event_id: "evt-mail".into(),
            mode: ExportMode::Email,
            module: ExportModule::UsageLogs,
            report_type: "autofill".into(),
            sub_type: "logs".into(),
            user_id: 2,
            client_id: 4,
            product_id: 1,
            filter: None,
            page_filter: None,
        }
    }

    #[tokio::test]
    async fn test_email_stub_reports_success_without_notification_url() {
        let store = Arc::new(MemoryObjectStore::new());
        let sink = EmailSink::new(store, 24);

        let handle = ArtifactHandle {
            bucket: "sifthub-exports".into(),
            key: "exports/4/evt-mail/report.xlsx".into(),
            presigned_url: "https://signed.example/report".into(),
        };
        let result = sink
            .deliver(ExportOutput::Artifact(handle), &job(), "report.xlsx")
            .await
            .unwrap();

        // The audit row still records where the artifact lives...
        assert!(result.download_url.is_some());
        // ...but the user-facing notification stays status-only.
        assert!(result.notification_url.is_none());
    }
}
