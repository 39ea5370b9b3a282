//! Insights analytics client
//!
//! Wraps the generate-answer overview endpoints. List endpoints paginate;
//! info-cards is a single page by contract.

use futures::Stream;
use tracing::info;

use crate::clients::http::{envelope_data, ServiceClient};
use crate::clients::{page_body, paged};
use crate::config::BATCH_SIZE;
use crate::error::ExportError;
use crate::types::{
    CategoryData, CategoryDistribution, FilterSet, InfoCards, SubCategoryData,
    SubCategoryDistribution, TopQuestionData, TopQuestions,
};

const INFO_CARDS_ENDPOINT: &str =
    "/api/v1/insights-service/generate-answer/overview/info-cards";
const CATEGORY_DISTRIBUTION_ENDPOINT: &str =
    "/api/v1/insights-service/generate-answer/overview/category-distribution";
const TOP_QUESTIONS_ENDPOINT: &str =
    "/api/v1/insights-service/generate-answer/overview/top-questions/list";

fn subcategory_endpoint(category_id: &str) -> String {
    format!(
        "/api/v1/insights-service/generate-answer/overview/category/{}/subcategory-distribution",
        category_id
    )
}

#[derive(Clone)]
pub struct InsightsClient {
    http: ServiceClient,
    host: String,
}

impl InsightsClient {
    pub fn new(http: ServiceClient, host: &str) -> Self {
        Self {
            http,
            host: host.to_string(),
        }
    }

    /// Fetch the overview info cards (frequency denominators).
    pub async fn info_cards(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
    ) -> Result<Option<InfoCards>, ExportError> {
        info!("Fetching insights info cards");
        let body = page_body(filter, page_filter, Some(1), Some(BATCH_SIZE));
        let envelope = self
            .http
            .post_envelope(&self.host, INFO_CARDS_ENDPOINT, &body)
            .await?;
        Ok(envelope_data(envelope, "info cards"))
    }

    pub async fn category_distribution(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page: u32,
        page_size: usize,
    ) -> Result<Option<Vec<CategoryData>>, ExportError> {
        info!("Fetching category distribution (page {}, size {})", page, page_size);
        let body = page_body(filter, page_filter, Some(page), Some(page_size));
        let envelope = self
            .http
            .post_envelope::<_, CategoryDistribution>(&self.host, CATEGORY_DISTRIBUTION_ENDPOINT, &body)
            .await?;
        Ok(envelope_data(envelope, "category distribution").map(|d| d.category))
    }

    pub async fn subcategory_distribution(
        &self,
        category_id: &str,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page: u32,
        page_size: usize,
    ) -> Result<Option<Vec<SubCategoryData>>, ExportError> {
        info!(
            "Fetching subcategory distribution for category {} (page {}, size {})",
            category_id, page, page_size
        );
        let body = page_body(filter, page_filter, Some(page), Some(page_size));
        let envelope = self
            .http
            .post_envelope::<_, SubCategoryDistribution>(
                &self.host,
                &subcategory_endpoint(category_id),
                &body,
            )
            .await?;
        Ok(envelope_data(envelope, "subcategory distribution").map(|d| d.sub_category))
    }

    pub async fn top_questions(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page: u32,
        page_size: usize,
    ) -> Result<Option<Vec<TopQuestionData>>, ExportError> {
        info!("Fetching top questions (page {}, size {})", page, page_size);
        let body = page_body(filter, page_filter, Some(page), Some(page_size));
        let envelope = self
            .http
            .post_envelope::<_, TopQuestions>(&self.host, TOP_QUESTIONS_ENDPOINT, &body)
            .await?;
        Ok(envelope_data(envelope, "top questions").map(|d| d.top_questions))
    }

    /// Lazy page stream over category distribution.
    pub fn category_pages(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<CategoryData>, ExportError>> {
        let client = self.clone();
        let filter = filter.cloned();
        let page_filter = page_filter.cloned();
        paged("category distribution", page_size, move |page| {
            let client = client.clone();
            let filter = filter.clone();
            let page_filter = page_filter.clone();
            async move {
                client
                    .category_distribution(filter.as_ref(), page_filter.as_ref(), page, page_size)
                    .await
            }
        })
    }

    /// Lazy page stream over one category's subcategory distribution.
    pub fn subcategory_pages(
        &self,
        category_id: &str,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<SubCategoryData>, ExportError>> {
        let client = self.clone();
        let category_id = category_id.to_string();
        let filter = filter.cloned();
        let page_filter = page_filter.cloned();
        paged("subcategory distribution", page_size, move |page| {
            let client = client.clone();
            let category_id = category_id.clone();
            let filter = filter.clone();
            let page_filter = page_filter.clone();
            async move {
                client
                    .subcategory_distribution(
                        &category_id,
                        filter.as_ref(),
                        page_filter.as_ref(),
                        page,
                        page_size,
                    )
                    .await
            }
        })
    }

    /// Lazy page stream over the top-questions list.
    pub fn top_question_pages(
        &self,
        filter: Option<&FilterSet>,
        page_filter: Option<&FilterSet>,
        page_size: usize,
    ) -> impl Stream<Item = Result<Vec<TopQuestionData>, ExportError>> {
        let client = self.clone();
        let filter = filter.cloned();
        let page_filter = page_filter.cloned();
        paged("top questions", page_size, move |page| {
            let client = client.clone();
            let filter = filter.clone();
            let page_filter = page_filter.clone();
            async move {
                client
                    .top_questions(filter.as_ref(), page_filter.as_ref(), page, page_size)
                    .await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcategory_endpoint_embeds_category_id() {
        assert_eq!(
            subcategory_endpoint("cat-9"),
            "/api/v1/insights-service/generate-answer/overview/category/cat-9/subcategory-distribution"
        );
    }
}
