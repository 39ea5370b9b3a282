//! Download delivery
//!
//! The streaming path receives an artifact already materialized in storage
//! and forwards its handle. The legacy path receives raw workbook bytes and
//! performs the upload + presign itself. Download is the only mode whose
//! completion notification carries the URL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::delivery::{DeliveryResult, DeliverySink};
use crate::error::ExportError;
use crate::reports::ExportOutput;
use crate::storage::{export_key_for_job, ObjectStorage, XLSX_CONTENT_TYPE};
use crate::types::ExportJob;

pub struct DownloadSink {
    store: Arc<dyn ObjectStorage>,
    expiry_hours: u64,
}

impl DownloadSink {
    pub fn new(store: Arc<dyn ObjectStorage>, expiry_hours: u64) -> Self {
        Self {
            store,
            expiry_hours,
        }
    }
}

#[async_trait]
impl DeliverySink for DownloadSink {
    async fn deliver(
        &self,
        output: ExportOutput,
        job: &ExportJob,
        filename: &str,
    ) -> Result<DeliveryResult, ExportError> {
        let (bucket, key, url) = match output {
            ExportOutput::Artifact(handle) => {
                info!(
                    "Delivering streamed artifact for event {}: {}",
                    job.event_id, handle.key
                );
                (handle.bucket, handle.key, handle.presigned_url)
            }
            ExportOutput::Stream(bytes) => {
                // Legacy path: the builder produced the workbook in memory.
                let key = export_key_for_job(job, Utc::now());
                info!(
                    "Uploading in-memory export for event {} as {} ({})",
                    job.event_id, key, filename
                );
                self.store.put(&key, bytes, XLSX_CONTENT_TYPE).await?;
                let url = self.store.presign_get(&key, self.expiry_hours).await?;
                (self.store.bucket().to_string(), key, url)
            }
        };

        Ok(DeliveryResult {
            bucket: Some(bucket),
            key: Some(key),
            download_url: Some(url.clone()),
            notification_url: Some(url),
        })
    }
}
