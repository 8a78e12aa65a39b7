//! HTTP client for the survey platform's v5 REST API

use crate::api::{ListApi, Page, PageRequest, ResourcePath};
use crate::config::ApiConfig;
use crate::error::{ExtractError, Result};
use crate::filter::FilterSet;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Only this API version is implemented
pub const SUPPORTED_API_VERSION: &str = "v5";

/// Longest response-body excerpt carried into an error message
const ERROR_BODY_LIMIT: usize = 512;

/// API client authenticated with an api-key pair.
///
/// One instance is constructed per run and passed by reference to whatever
/// needs it.
pub struct ApiClient {
    client: Client,
    root: String,
    token: String,
    token_secret: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.version != SUPPORTED_API_VERSION {
            return Err(ExtractError::config(format!(
                "API version '{}' is not supported, only {}",
                config.version, SUPPORTED_API_VERSION
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            root: format!("{}/{}", config.base_url.trim_end_matches('/'), config.version),
            token: config.token.clone(),
            token_secret: config.token_secret.clone(),
        })
    }

    /// Versioned API root, e.g. `https://api.alchemer.com/v5`
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Create a sub-object. The remote API uses PUT for creation.
    pub async fn create(&self, path: &ResourcePath, params: &[(&str, &str)]) -> Result<Value> {
        let params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.send(Method::PUT, path, params).await
    }

    pub async fn delete(&self, path: &ResourcePath) -> Result<Value> {
        self.send(Method::DELETE, path, Vec::new()).await
    }

    async fn send(
        &self,
        method: Method,
        path: &ResourcePath,
        mut params: Vec<(String, String)>,
    ) -> Result<Value> {
        let url = path.url(&self.root);
        debug!(%method, %url, params = params.len(), "API request");

        params.push(("api_token".to_string(), self.token.clone()));
        params.push(("api_token_secret".to_string(), self.token_secret.clone()));

        let response = self
            .client
            .request(method, &url)
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(ExtractError::api(
                status.as_u16(),
                format!("{} {}: {}", status, path, excerpt),
            ));
        }

        let body: Value = response.json().await?;
        if body.get("result_ok").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("result_ok=false")
                .to_string();
            return Err(ExtractError::api(status.as_u16(), message));
        }
        Ok(body)
    }
}

#[async_trait]
impl ListApi for ApiClient {
    #[instrument(skip(self, filters), fields(path = %path, page = request.page))]
    async fn list_page(
        &self,
        path: &ResourcePath,
        filters: &FilterSet,
        request: PageRequest,
    ) -> Result<Page> {
        let mut params = filters.to_query();
        params.push(("page".to_string(), request.page.to_string()));
        if let Some(size) = request.page_size {
            params.push(("resultsperpage".to_string(), size.to_string()));
        }

        let envelope = self.send(Method::GET, path, params).await?;
        Page::from_envelope(envelope)
    }
}
