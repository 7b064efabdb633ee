//! Read-path HTTP client for the civic-issue REST API, implementing the
//! fetch seams `sync_core` consumes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    error::{ApiErrorBody, ApiException, ErrorCode},
    protocol::{CategoriesResponse, CategoryInfo, IssueStatsSummary, IssueSummary, PlatformStats},
};
use sync_core::{PageSource, QuerySpec};
use thiserror::Error;
use url::Url;

pub mod config;
pub mod dashboard;

pub use config::{load_settings, ApiSettings};

/// The backend validates search length (2..=100 characters); committed text
/// outside those bounds is treated as "no search filter" rather than letting
/// every refresh fail with a validation error.
const MIN_SEARCH_LEN: usize = 2;
const MAX_SEARCH_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("invalid base url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    Build(reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[error("{endpoint} rejected the request: {source}")]
    Api {
        endpoint: &'static str,
        source: ApiException,
    },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        source: reqwest::Error,
    },
}

/// Flat parameter set for the list endpoint; absent values mean "no filter".
#[derive(Debug, Serialize)]
struct ListIssuesQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
    sort_by: &'a str,
    skip: u32,
    limit: u32,
}

pub struct IssueApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl IssueApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiClientError> {
        let base_url = Url::parse(&settings.base_url).map_err(|source| {
            ApiClientError::InvalidBaseUrl {
                url: settings.base_url.clone(),
                source,
            }
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(ApiClientError::Build)?;
        Ok(Self { http, base_url })
    }

    pub async fn list_issues(
        &self,
        spec: &QuerySpec,
        limit: u32,
    ) -> Result<Vec<IssueSummary>, ApiClientError> {
        const ENDPOINT: &str = "/api/v1/issues";
        let search = spec.search.trim();
        let search_len = search.chars().count();
        let query = ListIssuesQuery {
            category: spec.category.as_deref(),
            status: spec.status.map(|status| status.as_str()),
            search: (MIN_SEARCH_LEN..=MAX_SEARCH_LEN)
                .contains(&search_len)
                .then_some(search),
            sort_by: spec.sort_by.query_value(),
            skip: spec.offset(limit),
            limit,
        };
        self.get_json(ENDPOINT, Some(&query)).await
    }

    pub async fn issue_stats(&self) -> Result<IssueStatsSummary, ApiClientError> {
        self.get_json("/api/v1/issues/stats/summary", None::<&()>)
            .await
    }

    pub async fn platform_stats(&self) -> Result<PlatformStats, ApiClientError> {
        self.get_json("/api/stats", None::<&()>).await
    }

    pub async fn categories(&self) -> Result<Vec<CategoryInfo>, ApiClientError> {
        let response: CategoriesResponse = self.get_json("/api/categories", None::<&()>).await?;
        Ok(response.categories)
    }

    async fn get_json<Q, R>(
        &self,
        endpoint: &'static str,
        query: Option<&Q>,
    ) -> Result<R, ApiClientError>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|source| ApiClientError::InvalidBaseUrl {
                url: format!("{}{endpoint}", self.base_url),
                source,
            })?;
        let mut request = self.http.get(url);
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request
            .send()
            .await
            .map_err(|source| ApiClientError::Transport { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            let exception = match response.json::<ApiErrorBody>().await {
                Ok(body) => ApiException::from_response(status.as_u16(), body),
                Err(_) => ApiException::new(
                    ErrorCode::from_status(status.as_u16()),
                    status.canonical_reason().unwrap_or("unknown error"),
                ),
            };
            return Err(ApiClientError::Api {
                endpoint,
                source: exception,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|source| ApiClientError::Decode { endpoint, source })
    }
}

#[async_trait]
impl PageSource<IssueSummary> for IssueApiClient {
    async fn fetch_page(&self, spec: &QuerySpec, limit: u32) -> anyhow::Result<Vec<IssueSummary>> {
        Ok(self.list_issues(spec, limit).await?)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
