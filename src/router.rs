//! Job router
//!
//! Owns one job from PROCESSING to its terminal audit state: route the job to
//! its report builder, hand the artifact to the delivery sink, then record
//! SUCCESS with elapsed seconds and artifact pointers, or FAILED. Exactly one
//! terminal status is written per attempt, and a download URL only ever
//! accompanies SUCCESS.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info};

use crate::audit::{AuditLog, AuditUpdate};
use crate::delivery::SinkRegistry;
use crate::error::ExportError;
use crate::notify::Notifier;
use crate::reports::{BuilderRegistry, JobContext};
use crate::types::{ExportJob, ExportStatus};

pub struct JobRouter {
    builders: BuilderRegistry,
    sinks: SinkRegistry,
    audit: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
}

impl JobRouter {
    pub fn new(
        builders: BuilderRegistry,
        sinks: SinkRegistry,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            builders,
            sinks,
            audit,
            notifier,
        }
    }

    /// Run one job pipeline to completion. The returned error's poison flag
    /// tells the consumer whether to acknowledge the broker message.
    pub async fn process(&self, job: &ExportJob, ctx: &JobContext) -> Result<(), ExportError> {
        let started = Instant::now();
        info!(
            "Processing export {} ({} / {} / {})",
            job.event_id,
            job.module.as_str(),
            job.report_type,
            job.sub_type
        );

        self.audit
            .update_status(
                &job.event_id,
                job.client_id,
                ExportStatus::Processing,
                AuditUpdate::default(),
            )
            .await;

        let Some(builder) = self.builders.lookup(job) else {
            let err = ExportError::UnsupportedReport {
                module: job.module.as_str().to_string(),
                report_type: job.report_type.clone(),
                sub_type: job.sub_type.clone(),
            };
            self.fail(job, &err).await;
            return Err(err);
        };

        let Some(sink) = self.sinks.lookup(job.mode) else {
            let err = ExportError::UnsupportedReport {
                module: job.module.as_str().to_string(),
                report_type: job.report_type.clone(),
                sub_type: format!("mode:{}", job.mode.as_str()),
            };
            self.fail(job, &err).await;
            return Err(err);
        };

        let output = match builder.build(job, ctx).await {
            Ok(output) => output,
            Err(err) => {
                self.fail(job, &err).await;
                return Err(err);
            }
        };

        let filename = builder.filename(job);
        let delivered = match sink.deliver(output, job, &filename).await {
            Ok(delivered) => delivered,
            Err(err) => {
                self.fail(job, &err).await;
                return Err(err);
            }
        };

        let total_time = started.elapsed().as_secs() as i64;
        self.audit
            .update_status(
                &job.event_id,
                job.client_id,
                ExportStatus::Success,
                AuditUpdate {
                    total_time: Some(total_time),
                    s3_bucket: delivered.bucket,
                    download_url: delivered.download_url,
                },
            )
            .await;

        // Notification comes last so its timestamp postdates the terminal
        // audit write. The sink decided whether it carries the URL.
        self.notifier
            .publish_export_notification(
                job,
                delivered.notification_url.as_deref(),
                ExportStatus::Success,
            )
            .await;

        info!(
            "Export {} completed in {}s",
            job.event_id, total_time
        );
        Ok(())
    }

    /// Terminal failure path: mark the audit row FAILED and tell the user.
    /// Both calls swallow their own errors, so the original failure always
    /// propagates to the consumer untouched.
    async fn fail(&self, job: &ExportJob, err: &ExportError) {
        error!("Export {} failed: {}", job.event_id, err);
        self.audit
            .update_status(
                &job.event_id,
                job.client_id,
                ExportStatus::Failed,
                AuditUpdate::default(),
            )
            .await;
        self.notifier
            .publish_export_notification(job, None, ExportStatus::Failed)
            .await;
    }
}
