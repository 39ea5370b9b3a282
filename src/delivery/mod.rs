//! Delivery sinks
//!
//! A sink finalizes delivery of a finished artifact to the user: the download
//! sink presents a time-limited URL, the email sink is an explicit stub that
//! defers to download semantics. A sink decides what the completion
//! notification may carry (`notification_url`); the router publishes it after
//! the terminal audit write so the notification always postdates the audit
//! row.

pub mod download;
pub mod email;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ExportError;
use crate::reports::ExportOutput;
use crate::types::{ExportJob, ExportMode};

/// Outcome of a delivery, feeding the terminal audit transition and the
/// completion notification.
#[derive(Debug, Clone, Default)]
pub struct DeliveryResult {
    pub bucket: Option<String>,
    pub key: Option<String>,
    pub download_url: Option<String>,
    /// URL to expose in the user notification. Only the download mode carries
    /// one; other modes notify status-only.
    pub notification_url: Option<String>,
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(
        &self,
        output: ExportOutput,
        job: &ExportJob,
        filename: &str,
    ) -> Result<DeliveryResult, ExportError>;
}

/// Dispatch table from delivery mode to sink, populated once at startup.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: HashMap<ExportMode, Arc<dyn DeliverySink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mode: ExportMode, sink: Arc<dyn DeliverySink>) {
        self.sinks.insert(mode, sink);
    }

    pub fn lookup(&self, mode: ExportMode) -> Option<Arc<dyn DeliverySink>> {
        self.sinks.get(&mode).cloned()
    }
}
