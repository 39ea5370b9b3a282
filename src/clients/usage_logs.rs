//! Usage-log analytics client
//!
//! Answer, autofill and AI-teammate endpoints, each with a paginated `list`
//! and a single-summary `stats` call.

use futures::Stream;
use tracing::info;

use crate::clients::http::{envelope_data, ServiceClient};
use crate::clients::{page_body, paged};
use crate::error::ExportError;
use crate::types::{
    AnswerStats, AutofillStats, FilterSet, GenerationLog, TeammateLog, TeammateStats,
};

const ANSWER_LIST_ENDPOINT: &str = "/api/v1/analytics-service/usage-logs/answer/list";
const ANSWER_STATS_ENDPOINT: &str = "/api/v1/analytics-service/usage-logs/answer/stats";
const AUTOFILL_LIST_ENDPOINT: &str = "/api/v1/analytics-service/usage-logs/autofill/list";
const AUTOFILL_STATS_ENDPOINT: &str = "/api/v1/analytics-service/usage-logs/autofill/stats";
const TEAMMATE_LIST_ENDPOINT: &str = "/api/v1/analytics-service/usage-logs/teammate/list";
const TEAMMATE_STATS_ENDPOINT: &str = "/api/v1/analytics-service/usage-logs/teammate/stats";

#[derive(Clone)]
pub struct UsageLogsClient {
    http: ServiceClient,
    host: String,
}

impl UsageLogsClient {
    pub fn new(http: ServiceClient, host: &str) -> Self {
        Self {
            http,
            host: host.to_string(),
        }
    }

    async fn list_page<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        what: &str,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page: u32,
        page_size: usize,
    ) -> Result<Option<Vec<T>>, ExportError> {
        info!("Fetching {} (page {}, size {})", what, page, page_size);
        let body = page_body(filter, page_filter, Some(page), Some(page_size));
        let envelope = self
            .http
            .post_envelope::<_, Vec<T>>(&self.host, endpoint, &body)
            .await?;
        Ok(envelope_data(envelope, what))
    }

    async fn stats<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        what: &str,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
    ) -> Result<Option<T>, ExportError> {
        info!("Fetching {}", what);
        let body = page_body(filter, page_filter, None, None);
        let envelope = self.http.post_envelope(&self.host, endpoint, &body).await?;
        Ok(envelope_data(envelope, what))
    }

    pub async fn answer_logs(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page: u32,
        page_size: usize,
    ) -> Result<Option<Vec<GenerationLog>>, ExportError> {
        self.list_page(ANSWER_LIST_ENDPOINT, "answer logs", filter, page_filter, page, page_size)
            .await
    }

    pub async fn answer_stats(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
    ) -> Result<Option<AnswerStats>, ExportError> {
        self.stats(ANSWER_STATS_ENDPOINT, "answer stats", filter, page_filter)
            .await
    }

    pub async fn autofill_logs(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page: u32,
        page_size: usize,
    ) -> Result<Option<Vec<GenerationLog>>, ExportError> {
        self.list_page(
            AUTOFILL_LIST_ENDPOINT,
            "autofill logs",
            filter,
            page_filter,
            page,
            page_size,
        )
        .await
    }

    pub async fn autofill_stats(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
    ) -> Result<Option<AutofillStats>, ExportError> {
        self.stats(AUTOFILL_STATS_ENDPOINT, "autofill stats", filter, page_filter)
            .await
    }

    pub async fn teammate_logs(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page: u32,
        page_size: usize,
    ) -> Result<Option<Vec<TeammateLog>>, ExportError> {
        self.list_page(
            TEAMMATE_LIST_ENDPOINT,
            "AI teammate logs",
            filter,
            page_filter,
            page,
            page_size,
        )
        .await
    }

    pub async fn teammate_stats(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
    ) -> Result<Option<TeammateStats>, ExportError> {
        self.stats(TEAMMATE_STATS_ENDPOINT, "AI teammate stats", filter, page_filter)
            .await
    }

    pub fn answer_log_pages(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<GenerationLog>, ExportError>> {
        self.log_pages(ANSWER_LIST_ENDPOINT, "answer logs", filter, page_filter, page_size)
    }

    pub fn autofill_log_pages(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<GenerationLog>, ExportError>> {
        self.log_pages(
            AUTOFILL_LIST_ENDPOINT,
            "autofill logs",
            filter,
            page_filter,
            page_size,
        )
    }

    pub fn teammate_log_pages(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<TeammateLog>, ExportError>> {
        self.log_pages(
            TEAMMATE_LIST_ENDPOINT,
            "AI teammate logs",
            filter,
            page_filter,
            page_size,
        )
    }

    fn log_pages<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        what: &'static str,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<T>, ExportError>> {
        let client = self.clone();
        let filter = filter.cloned();
        let page_filter = page_filter.cloned();
        paged(what, page_size, move |page| {
            let client = client.clone();
            let filter = filter.clone();
            let page_filter = page_filter.clone();
            async move {
                client
                    .list_page(endpoint, what, filter.as_ref(), page_filter.as_ref(), page, page_size)
                    .await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_families_cover_all_types() {
        for (list, stats) in [
            (ANSWER_LIST_ENDPOINT, ANSWER_STATS_ENDPOINT),
            (AUTOFILL_LIST_ENDPOINT, AUTOFILL_STATS_ENDPOINT),
            (TEAMMATE_LIST_ENDPOINT, TEAMMATE_STATS_ENDPOINT),
        ] {
            assert!(list.starts_with("/api/v1/analytics-service/usage-logs/"));
            assert!(list.ends_with("/list"));
            assert!(stats.ends_with("/stats"));
        }
    }
}
