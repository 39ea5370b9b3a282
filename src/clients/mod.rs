//! Upstream service clients
//!
//! Each analytics endpoint comes in two forms: a single-call fetch and a lazy
//! page stream. Streams are finite, forward-only and consumed exactly once by
//! a report builder.

pub mod http;
pub mod insights;
pub mod usage_logs;
pub mod user_role;

use std::future::Future;

use async_stream::try_stream;
use futures::Stream;
use tracing::{info, warn};

use crate::error::ExportError;

/// Safety cap on pages fetched per stream. Hitting it logs a warning and ends
/// the stream rather than the job.
pub const MAX_PAGE_FETCHES: u32 = 1000;

/// Generic pagination driver shared by every list endpoint.
///
/// Contract: pages are 1-based; a missing or empty page ends the stream; a
/// page shorter than `page_size` is the final page and is still yielded.
pub(crate) fn paged<T, F, Fut>(
    what: &'static str,
    page_size: usize,
    fetch: F,
) -> impl Stream<Item = Result<Vec<T>, ExportError>>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Option<Vec<T>>, ExportError>>,
{
    try_stream! {
        let mut page = 1u32;
        loop {
            let batch = fetch(page).await?;
            let Some(items) = batch else {
                info!("{} stream ended at page {}", what, page);
                break;
            };
            if items.is_empty() {
                info!("{} stream ended at page {} (empty page)", what, page);
                break;
            }
            let last = items.len() < page_size;
            yield items;
            if last {
                break;
            }
            page += 1;
            if page > MAX_PAGE_FETCHES {
                warn!("{} stream reached the {} page cap, stopping", what, MAX_PAGE_FETCHES);
                break;
            }
        }
    }
}

/// Request body for paginated analytics calls.
pub(crate) fn page_body(
    filter: Option<&crate::types::FilterSet>,
    page_filter: Option<&crate::types::FilterSet>,
    page: Option<u32>,
    page_size: Option<usize>,
) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    if let Some(page) = page {
        body.insert("page".into(), page.into());
    }
    if let Some(size) = page_size {
        body.insert("pageSize".into(), size.into());
    }
    if let Some(filter) = filter {
        body.insert("filter".into(), serde_json::json!(filter));
    }
    if let Some(page_filter) = page_filter {
        body.insert("pageFilter".into(), serde_json::json!(page_filter));
    }
    serde_json::Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fetcher that serves `total` items in pages of `page_size`.
    fn counting_fetch(
        total: usize,
        page_size: usize,
        calls: &AtomicU32,
    ) -> impl Fn(u32) -> std::future::Ready<Result<Option<Vec<u32>>, ExportError>> + '_ {
        move |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            let start = (page as usize - 1) * page_size;
            let end = total.min(start + page_size);
            let items: Vec<u32> = (start..end).map(|i| i as u32).collect();
            std::future::ready(Ok(Some(items)))
        }
    }

    #[tokio::test]
    async fn test_paged_zero_items_yields_zero_pages() {
        let calls = AtomicU32::new(0);
        let stream = paged("test", 100, counting_fetch(0, 100, &calls));
        let pages: Vec<Vec<u32>> = stream.try_collect().await.unwrap();
        assert!(pages.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paged_237_items_three_pages() {
        let calls = AtomicU32::new(0);
        let stream = paged("test", 100, counting_fetch(237, 100, &calls));
        let pages: Vec<Vec<u32>> = stream.try_collect().await.unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].len(), 100);
        assert_eq!(pages[1].len(), 100);
        assert_eq!(pages[2].len(), 37);
        // short final page means no fourth call
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_paged_exact_multiple_probes_one_extra_page() {
        let calls = AtomicU32::new(0);
        let stream = paged("test", 100, counting_fetch(200, 100, &calls));
        let pages: Vec<Vec<u32>> = stream.try_collect().await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_paged_none_ends_stream() {
        let stream = paged("test", 10, |_page| {
            std::future::ready(Ok::<Option<Vec<u32>>, ExportError>(None))
        });
        let pages: Vec<Vec<u32>> = stream.try_collect().await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_paged_error_propagates() {
        let stream = paged("test", 10, |page| {
            std::future::ready(if page == 2 {
                Err(ExportError::Upstream("connection reset".into()))
            } else {
                Ok(Some(vec![0u32; 10]))
            })
        });
        futures::pin_mut!(stream);
        assert!(stream.try_next().await.unwrap().is_some());
        assert!(stream.try_next().await.is_err());
    }

    #[tokio::test]
    async fn test_paged_respects_page_cap() {
        let calls = AtomicU32::new(0);
        let stream = paged("test", 1, |_page| {
            calls.fetch_add(1, Ordering::SeqCst);
            // always a full page, never terminates on its own
            std::future::ready(Ok(Some(vec![1u32])))
        });
        let pages: Vec<Vec<u32>> = stream.try_collect().await.unwrap();
        assert_eq!(pages.len(), MAX_PAGE_FETCHES as usize);
    }

    #[test]
    fn test_page_body_shape() {
        let body = page_body(None, None, Some(3), Some(100));
        assert_eq!(body["page"], 3);
        assert_eq!(body["pageSize"], 100);
        assert!(body.get("filter").is_none());
    }
}
