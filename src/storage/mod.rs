//! Object storage adapter
//!
//! `ObjectStorage` is the seam between the report pipeline and S3 — swap in
//! `S3ObjectStore` in production, `MemoryObjectStore` in tests. The pipeline
//! guarantees one in-flight write per key, so no object-level locking is
//! needed here.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::error::ExportError;
use crate::types::ExportJob;

/// Office spreadsheet MIME type, the default content type for artifacts.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Objects above this size go through multipart upload (AWS guidance).
pub const MULTIPART_THRESHOLD: usize = 5 * 1024 * 1024;

/// Part size for multipart uploads. AWS requires at least 5 MiB per part
/// except the last.
pub const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Storage key for an export artifact.
pub fn export_key(client_id: i64, event_id: &str, filename: &str) -> String {
    format!("exports/{}/{}/{}", client_id, event_id, filename)
}

/// Legacy key builder for delivery-side uploads: the filename is derived from
/// the route rather than supplied by a builder.
pub fn export_key_for_job(job: &ExportJob, now: DateTime<Utc>) -> String {
    let filename = format!(
        "{}_{}_{}_{}.xlsx",
        job.module.as_str(),
        job.report_type,
        job.sub_type,
        now.format("%Y%m%d_%H%M%S")
    );
    export_key(job.client_id, &job.event_id, &filename)
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), ExportError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ExportError>;

    /// Issue a time-limited GET URL for a stored object.
    async fn presign_get(&self, key: &str, expiry_hours: u64) -> Result<String, ExportError>;

    fn bucket(&self) -> &str;
}

// ==========================================================================
// S3 implementation
// ==========================================================================

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    async fn put_simple(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ExportError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ExportError::StorageWrite {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ExportError> {
        info!(
            "Multipart upload for {} ({} MiB)",
            key,
            bytes.len() / (1024 * 1024)
        );

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ExportError::StorageWrite {
                key: key.to_string(),
                message: format!("multipart init failed: {e}"),
            })?;

        let upload_id = created.upload_id().ok_or_else(|| ExportError::StorageWrite {
            key: key.to_string(),
            message: "multipart init returned no upload id".to_string(),
        })?;

        match self.upload_parts(key, upload_id, &bytes).await {
            Ok(parts) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder().set_parts(Some(parts)).build(),
                    )
                    .send()
                    .await
                    .map_err(|e| ExportError::StorageWrite {
                        key: key.to_string(),
                        message: format!("multipart complete failed: {e}"),
                    })?;
                Ok(())
            }
            Err(err) => {
                // Never leave an orphaned upload id behind.
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .send()
                    .await
                {
                    error!("Failed to abort multipart upload for {}: {}", key, abort_err);
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        bytes: &[u8],
    ) -> Result<Vec<CompletedPart>, ExportError> {
        let mut parts = Vec::new();
        for (index, chunk) in bytes.chunks(MULTIPART_PART_SIZE).enumerate() {
            let part_number = index as i32 + 1;
            debug!("Uploading part {} of {} ({} bytes)", part_number, key, chunk.len());

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| ExportError::StorageWrite {
                    key: key.to_string(),
                    message: format!("part {part_number} upload failed: {e}"),
                })?;

            let e_tag = uploaded.e_tag().ok_or_else(|| ExportError::StorageWrite {
                key: key.to_string(),
                message: format!("no ETag returned for part {part_number}"),
            })?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(e_tag)
                    .build(),
            );
        }
        Ok(parts)
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ExportError> {
        debug!("Uploading {} ({} bytes)", key, bytes.len());
        if bytes.len() > MULTIPART_THRESHOLD {
            self.put_multipart(key, bytes, content_type).await
        } else {
            self.put_simple(key, bytes, content_type).await
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ExportError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ExportError::StorageRead {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let bytes = output.body.collect().await.map_err(|e| ExportError::StorageRead {
            key: key.to_string(),
            message: format!("body read failed: {e}"),
        })?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn presign_get(&self, key: &str, expiry_hours: u64) -> Result<String, ExportError> {
        let config = PresigningConfig::expires_in(Duration::from_secs(expiry_hours * 3600))
            .map_err(|e| ExportError::StorageRead {
                key: key.to_string(),
                message: format!("invalid presign expiry: {e}"),
            })?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| ExportError::StorageRead {
                key: key.to_string(),
                message: format!("presign failed: {e}"),
            })?;

        info!("Presigned {} for {} hours", key, expiry_hours);
        Ok(presigned.uri().to_string())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

// ==========================================================================
// MemoryObjectStore — in-memory implementation for tests
// ==========================================================================

/// Stores objects in a map. Used by unit tests of the builders and sinks.
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    bucket: String,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            bucket: "memory-exports".to_string(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ExportError> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ExportError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ExportError::StorageRead {
                key: key.to_string(),
                message: "no such object".to_string(),
            })
    }

    async fn presign_get(&self, key: &str, expiry_hours: u64) -> Result<String, ExportError> {
        Ok(format!(
            "https://{}.example/{}?expires={}h",
            self.bucket, key, expiry_hours
        ))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExportMode, ExportModule};
    use chrono::TimeZone;

    #[test]
    fn test_export_key_shape() {
        let key = export_key(7, "evt-1", "report.xlsx");
        assert_eq!(key, "exports/7/evt-1/report.xlsx");
    }

    #[test]
    fn test_export_key_for_job_embeds_route_and_timestamp() {
        let job = ExportJob {
            event_id: "evt-2".into(),
            mode: ExportMode::Download,
            module: ExportModule::UsageLogs,
            report_type: "answer".into(),
            sub_type: "logs".into(),
            user_id: 1,
            client_id: 9,
            product_id: 1,
            filter: None,
            page_filter: None,
        };
        let now = Utc.with_ymd_and_hms(2025, 5, 3, 18, 30, 0).unwrap();
        let key = export_key_for_job(&job, now);
        assert_eq!(key, "exports/9/evt-2/usageLogs_answer_logs_20250503_183000.xlsx");
    }

    #[test]
    fn test_multipart_constants_match_aws_minimums() {
        assert_eq!(MULTIPART_THRESHOLD, 5 * 1024 * 1024);
        assert_eq!(MULTIPART_PART_SIZE, MULTIPART_THRESHOLD);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store
            .put("exports/1/e/a.xlsx", vec![1, 2, 3], XLSX_CONTENT_TYPE)
            .await
            .unwrap();
        assert_eq!(store.get("exports/1/e/a.xlsx").await.unwrap(), vec![1, 2, 3]);

        let url = store.presign_get("exports/1/e/a.xlsx", 24).await.unwrap();
        assert!(url.contains("exports/1/e/a.xlsx"));
    }

    #[tokio::test]
    async fn test_memory_store_missing_key_is_storage_read_error() {
        let store = MemoryObjectStore::new();
        let err = store.get("exports/none").await.unwrap_err();
        assert!(matches!(err, ExportError::StorageRead { .. }));
    }
}
