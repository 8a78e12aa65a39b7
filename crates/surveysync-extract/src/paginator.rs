//! Walks a paged list endpoint to completion
//!
//! Pagination is strictly sequential: `total_pages` is only known once the
//! first page has arrived. Any failure aborts the whole walk, so a partial
//! result is never handed back as if it were complete.

use crate::api::{ListApi, PageRequest, ResourcePath};
use crate::error::{ExtractError, Result};
use crate::filter::FilterSet;
use serde_json::Value;
use tracing::{debug, warn};

/// Page sizing for one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingPolicy {
    /// Records per page; `None` uses the remote default
    pub page_size: Option<u32>,
    /// Allow one restart from page 1 with half the page size when the source
    /// misbehaves mid-walk. Only applies when `page_size` is set.
    pub degraded_retry: bool,
}

impl Default for PagingPolicy {
    fn default() -> Self {
        Self {
            page_size: None,
            degraded_retry: true,
        }
    }
}

impl PagingPolicy {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            page_size: Some(page_size),
            ..Self::default()
        }
    }
}

pub struct Paginator<'a, A: ListApi + ?Sized> {
    api: &'a A,
    policy: PagingPolicy,
}

impl<'a, A: ListApi + ?Sized> Paginator<'a, A> {
    pub fn new(api: &'a A, policy: PagingPolicy) -> Self {
        Self { api, policy }
    }

    /// All records of `path` matching `filters`, in page order
    pub async fn fetch_all(&self, path: &ResourcePath, filters: &FilterSet) -> Result<Vec<Value>> {
        let first_attempt = self.walk(path, filters, self.policy.page_size).await;

        let err = match first_attempt {
            Ok(records) => return Ok(records),
            Err(err) => err,
        };

        let halved = match self.policy.page_size {
            Some(size) if self.policy.degraded_retry && size > 1 => size / 2,
            _ => return Err(err),
        };
        if !err.is_retryable_with_smaller_pages() {
            return Err(err);
        }

        warn!(
            path = %path,
            error = %err,
            page_size = halved,
            "Pagination failed; restarting from page 1 with a smaller page size"
        );
        self.walk(path, filters, Some(halved)).await
    }

    async fn walk(
        &self,
        path: &ResourcePath,
        filters: &FilterSet,
        page_size: Option<u32>,
    ) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut request = PageRequest::first(page_size);

        loop {
            let page = self.api.list_page(path, filters, request).await?;

            // Absent, zero or one total pages all mean a single page.
            let total_pages = page.total_pages.unwrap_or(1).max(1);
            let reported = page.page.unwrap_or(request.page);
            if reported != request.page {
                debug!(
                    path = %path,
                    requested = request.page,
                    reported,
                    "Source reported a different page number than requested"
                );
            }

            let is_last = request.page >= total_pages;
            if let Some(expected) = page_size.filter(|size| *size > 0) {
                if !is_last && page.records.len() < expected as usize {
                    return Err(ExtractError::ShortPage {
                        page: request.page,
                        expected,
                        received: page.records.len(),
                    });
                }
            }

            debug!(
                path = %path,
                page = request.page,
                total_pages,
                records = page.records.len(),
                "Fetched page"
            );
            records.extend(page.records);

            if is_last {
                break;
            }
            request = request.next();
        }

        Ok(records)
    }
}

/// Chainable list query: accumulate filters, then [`Query::list`].
///
/// ```no_run
/// # use surveysync_extract::{api::{ApiClient, endpoints}, paginator::{Query, PagingPolicy}};
/// # async fn demo(client: &ApiClient) -> surveysync_extract::Result<()> {
/// let disqualified = Query::new(client, endpoints::survey_responses("42"))
///     .filter("status", "=", "Disqualified")?
///     .filter("date_submitted", ">=", "2024-07-01 00:00:00 -05:00")?
///     .list(PagingPolicy::default())
///     .await?;
/// # Ok(()) }
/// ```
pub struct Query<'a, A: ListApi + ?Sized> {
    api: &'a A,
    path: ResourcePath,
    filters: FilterSet,
}

impl<A: ListApi + ?Sized> Clone for Query<'_, A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api,
            path: self.path.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<'a, A: ListApi + ?Sized> Query<'a, A> {
    pub fn new(api: &'a A, path: ResourcePath) -> Self {
        Self {
            api,
            path,
            filters: FilterSet::new(),
        }
    }

    /// New query with one more predicate; `self` is left unchanged
    pub fn filter(&self, field: &str, operator: &str, value: impl Into<String>) -> Result<Self> {
        Ok(Self {
            filters: self.filters.filter(field, operator, value)?,
            ..self.clone()
        })
    }

    /// Replace the accumulated filters wholesale
    pub fn with_filters(self, filters: FilterSet) -> Self {
        Self { filters, ..self }
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Fetch every matching record; `paging` carries one-off overrides
    pub async fn list(&self, paging: PagingPolicy) -> Result<Vec<Value>> {
        Paginator::new(self.api, paging)
            .fetch_all(&self.path, &self.filters)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use crate::api::{endpoints, Page};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted pages and records every request
    pub(crate) struct ScriptedApi {
        pages: Mutex<VecDeque<Result<Page>>>,
        pub(crate) requests: Mutex<Vec<(String, PageRequest)>>,
    }

    impl ScriptedApi {
        pub(crate) fn new(pages: Vec<Result<Page>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ListApi for ScriptedApi {
        async fn list_page(
            &self,
            path: &ResourcePath,
            _filters: &FilterSet,
            request: PageRequest,
        ) -> Result<Page> {
            self.requests.lock().unwrap().push((path.to_string(), request));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ExtractError::api(500, "script exhausted")))
        }
    }

    pub(crate) fn page(page: u32, total_pages: Option<u32>, ids: &[u32]) -> Result<Page> {
        Ok(Page {
            page: Some(page),
            total_pages,
            total_count: None,
            records: ids.iter().map(|id| json!({ "id": id })).collect(),
        })
    }

    fn ids(records: &[Value]) -> Vec<u64> {
        records.iter().map(|r| r["id"].as_u64().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_three_pages_three_requests_in_order() {
        let api = ScriptedApi::new(vec![
            page(1, Some(3), &[1, 2]),
            page(2, Some(3), &[3, 4]),
            page(3, Some(3), &[5]),
        ]);

        let records = Paginator::new(&api, PagingPolicy::default())
            .fetch_all(&endpoints::surveys(), &FilterSet::new())
            .await
            .unwrap();

        assert_eq!(ids(&records), vec![1, 2, 3, 4, 5]);
        assert_eq!(api.request_count(), 3);
        let pages: Vec<u32> = api.requests.lock().unwrap().iter().map(|(_, r)| r.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_single_page_single_request() {
        for total in [Some(1), None, Some(0)] {
            let api = ScriptedApi::new(vec![page(1, total, &[1])]);
            let records = Paginator::new(&api, PagingPolicy::default())
                .fetch_all(&endpoints::surveys(), &FilterSet::new())
                .await
                .unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(api.request_count(), 1, "total_pages {total:?}");
        }
    }

    #[tokio::test]
    async fn test_failure_mid_walk_returns_error_not_partial_data() {
        let api = ScriptedApi::new(vec![
            page(1, Some(3), &[1, 2]),
            Err(ExtractError::api(404, "gone")),
        ]);

        let result = Paginator::new(&api, PagingPolicy::default())
            .fetch_all(&endpoints::surveys(), &FilterSet::new())
            .await;

        assert!(result.is_err());
        assert_eq!(api.request_count(), 2);
    }

    #[tokio::test]
    async fn test_short_final_page_is_accepted() {
        let api = ScriptedApi::new(vec![page(1, Some(2), &[1, 2, 3, 4]), page(2, Some(2), &[5])]);

        let records = Paginator::new(&api, PagingPolicy::with_page_size(4))
            .fetch_all(&endpoints::surveys(), &FilterSet::new())
            .await;

        assert_eq!(ids(&records.unwrap()), vec![1, 2, 3, 4, 5]);
        assert_eq!(api.request_count(), 2);
    }

    #[tokio::test]
    async fn test_degraded_retry_is_bounded_to_one_tier() {
        let api = ScriptedApi::new(vec![
            page(1, Some(3), &[1, 2]), // short for size 4
            page(1, Some(3), &[1]),    // short again for size 2
            page(2, Some(3), &[2, 3]),
        ]);

        let err = Paginator::new(&api, PagingPolicy::with_page_size(4))
            .fetch_all(&endpoints::surveys(), &FilterSet::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::ShortPage { expected: 2, .. }));
        let sizes: Vec<_> = api
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.page_size)
            .collect();
        assert_eq!(sizes, vec![Some(4), Some(2)]);
    }

    #[tokio::test]
    async fn test_degraded_retry_recovers() {
        let api = ScriptedApi::new(vec![
            page(1, Some(2), &[1, 2]), // short for size 4
            page(1, Some(2), &[1, 2]),
            page(2, Some(2), &[3]),
        ]);

        let records = Paginator::new(&api, PagingPolicy::with_page_size(4))
            .fetch_all(&endpoints::surveys(), &FilterSet::new())
            .await
            .unwrap();
        assert_eq!(ids(&records), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_no_retry_without_page_size_or_when_disabled() {
        let api = ScriptedApi::new(vec![Err(ExtractError::api(503, "busy"))]);
        assert!(Paginator::new(&api, PagingPolicy::default())
            .fetch_all(&endpoints::surveys(), &FilterSet::new())
            .await
            .is_err());
        assert_eq!(api.request_count(), 1);

        let api = ScriptedApi::new(vec![Err(ExtractError::api(503, "busy"))]);
        let policy = PagingPolicy {
            page_size: Some(100),
            degraded_retry: false,
        };
        assert!(Paginator::new(&api, policy)
            .fetch_all(&endpoints::surveys(), &FilterSet::new())
            .await
            .is_err());
        assert_eq!(api.request_count(), 1);
    }

    #[tokio::test]
    async fn test_query_builder_is_immutable_and_rejects_bad_operator() {
        let api = ScriptedApi::new(vec![page(1, Some(1), &[1])]);
        let base = Query::new(&api, endpoints::survey_responses("42"));
        let narrowed = base.filter("status", "=", "Disqualified").unwrap();

        assert!(base.filters().is_empty());
        assert_eq!(narrowed.filters().len(), 1);
        assert!(matches!(
            narrowed.filter("date_submitted", "<=", "x"),
            Err(ExtractError::InvalidFilter(_))
        ));

        let records = narrowed.list(PagingPolicy::default()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(api.requests.lock().unwrap()[0].0, "survey/42/surveyresponse");
    }
}
