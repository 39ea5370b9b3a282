//! Report builders
//!
//! A builder turns one export job into one artifact. Builders own sheet
//! identities, column order and the row-to-cell mapping; they are registered
//! against `(module, type, subType)` routes at startup.

pub mod faq;
pub mod filters;
pub mod usage_logs;
pub mod workbook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ExportError;
use crate::types::{ExportJob, ExportModule};

/// Pointer to a finished artifact in object storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHandle {
    pub bucket: String,
    pub key: String,
    pub presigned_url: String,
}

/// What a builder hands to the delivery sink: either a handle to an artifact
/// already in storage (streaming path) or raw workbook bytes (legacy path).
pub enum ExportOutput {
    Artifact(ArtifactHandle),
    Stream(Vec<u8>),
}

/// Per-job cancellation context, tied to the broker visibility timeout and
/// process shutdown.
#[derive(Clone)]
pub struct JobContext {
    token: CancellationToken,
}

impl JobContext {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Bail out between suspension points once the job's signal has fired.
    pub fn ensure_active(&self) -> Result<(), ExportError> {
        if self.token.is_cancelled() {
            Err(ExportError::Cancelled("job cancellation signal fired".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for JobContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

#[async_trait]
pub trait ReportBuilder: Send + Sync {
    /// Assemble the artifact for this job.
    async fn build(&self, job: &ExportJob, ctx: &JobContext)
        -> Result<ExportOutput, ExportError>;

    /// User-facing filename for the delivery step.
    fn filename(&self, job: &ExportJob) -> String;
}

/// Route of a report request. `sub_type = None` registers a wildcard over
/// every sub-type of the `(module, type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub module: ExportModule,
    pub report_type: String,
    pub sub_type: Option<String>,
}

impl RouteKey {
    pub fn exact(module: ExportModule, report_type: &str, sub_type: &str) -> Self {
        Self {
            module,
            report_type: report_type.to_string(),
            sub_type: Some(sub_type.to_string()),
        }
    }

    pub fn any_sub_type(module: ExportModule, report_type: &str) -> Self {
        Self {
            module,
            report_type: report_type.to_string(),
            sub_type: None,
        }
    }
}

/// Dispatch table from route to builder, populated once at startup.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: HashMap<RouteKey, Arc<dyn ReportBuilder>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, route: RouteKey, builder: Arc<dyn ReportBuilder>) {
        self.builders.insert(route, builder);
    }

    /// Exact `(module, type, subType)` match first, then the `(module, type)`
    /// wildcard.
    pub fn lookup(&self, job: &ExportJob) -> Option<Arc<dyn ReportBuilder>> {
        let exact = RouteKey::exact(job.module, &job.report_type, &job.sub_type);
        if let Some(builder) = self.builders.get(&exact) {
            return Some(builder.clone());
        }
        let wildcard = RouteKey::any_sub_type(job.module, &job.report_type);
        self.builders.get(&wildcard).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExportMode;

    struct NullBuilder(&'static str);

    #[async_trait]
    impl ReportBuilder for NullBuilder {
        async fn build(
            &self,
            _job: &ExportJob,
            _ctx: &JobContext,
        ) -> Result<ExportOutput, ExportError> {
            Err(ExportError::Upstream("not a real builder".into()))
        }

        fn filename(&self, _job: &ExportJob) -> String {
            self.0.to_string()
        }
    }

    fn job(module: ExportModule, report_type: &str, sub_type: &str) -> ExportJob {
        ExportJob {
            event_id: "evt".into(),
            mode: ExportMode::Download,
            module,
            report_type: report_type.into(),
            sub_type: sub_type.into(),
            user_id: 1,
            client_id: 1,
            product_id: 1,
            filter: None,
            page_filter: None,
        }
    }

    fn registry() -> BuilderRegistry {
        let mut registry = BuilderRegistry::new();
        registry.register(
            RouteKey::exact(ExportModule::Insights, "responseGeneration", "frequentAskedQuestions"),
            Arc::new(NullBuilder("faq")),
        );
        registry.register(
            RouteKey::any_sub_type(ExportModule::UsageLogs, "answer"),
            Arc::new(NullBuilder("answer")),
        );
        registry
    }

    #[test]
    fn test_exact_route_lookup() {
        let registry = registry();
        let job = job(ExportModule::Insights, "responseGeneration", "frequentAskedQuestions");
        let builder = registry.lookup(&job).unwrap();
        assert_eq!(builder.filename(&job), "faq");
    }

    #[test]
    fn test_wildcard_sub_type_lookup() {
        let registry = registry();
        for sub in ["logs", "summary", ""] {
            let job = job(ExportModule::UsageLogs, "answer", sub);
            let builder = registry.lookup(&job).unwrap();
            assert_eq!(builder.filename(&job), "answer");
        }
    }

    #[test]
    fn test_unknown_route_is_none() {
        let registry = registry();
        assert!(registry
            .lookup(&job(ExportModule::Insights, "projectCollaboration", "x"))
            .is_none());
        assert!(registry.lookup(&job(ExportModule::UsageLogs, "answerX", "logs")).is_none());
    }

    #[test]
    fn test_cancelled_context_reports_cancelled() {
        let token = CancellationToken::new();
        let ctx = JobContext::new(token.clone());
        assert!(ctx.ensure_active().is_ok());
        token.cancel();
        assert!(matches!(ctx.ensure_active(), Err(ExportError::Cancelled(_))));
    }
}
