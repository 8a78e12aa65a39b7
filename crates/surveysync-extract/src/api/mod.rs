//! Remote survey-platform API
//!
//! The extraction engine only needs one capability from the remote side:
//! fetching a single page of a list endpoint. That capability is the
//! [`ListApi`] trait; [`ApiClient`] implements it over HTTP and tests
//! substitute scripted fakes.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::ApiClient;
pub use endpoints::ResourcePath;
pub use types::{record_id, Page, QuestionOption, Statistics, Survey, SurveyStatus};

use crate::error::{ExtractError, Result};
use crate::filter::FilterSet;
use async_trait::async_trait;
use serde_json::Value;

/// Which page to fetch and how large pages should be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    /// `None` leaves the page size to the remote default; `Some(0)` asks
    /// only for the totals
    pub page_size: Option<u32>,
}

impl PageRequest {
    pub fn first(page_size: Option<u32>) -> Self {
        Self { page: 1, page_size }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }
}

#[async_trait]
pub trait ListApi: Send + Sync {
    /// Fetch one page of `path`, constrained by `filters`
    async fn list_page(
        &self,
        path: &ResourcePath,
        filters: &FilterSet,
        request: PageRequest,
    ) -> Result<Page>;

    /// Fetch a single object such as `survey/{id}`
    async fn get_one(&self, path: &ResourcePath) -> Result<Value> {
        let page = self
            .list_page(path, &FilterSet::new(), PageRequest::first(None))
            .await?;
        page.records
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::api(404, format!("{} returned no data", path)))
    }

    /// Total number of matching records, without fetching any of them
    async fn probe_total(&self, path: &ResourcePath, filters: &FilterSet) -> Result<u64> {
        let page = self
            .list_page(path, filters, PageRequest::first(Some(0)))
            .await?;
        Ok(page.total_count.unwrap_or(page.records.len() as u64))
    }
}
