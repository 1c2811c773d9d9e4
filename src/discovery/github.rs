//! GitHub REST transport for [`MetadataFetcher`].
//!
//! Maps the search endpoint onto pages of [`RepositoryRecord`]s and turns
//! response headers into quota snapshots and freshness tokens. Retry and
//! backoff policy live in the coordinator, not here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, ETAG, IF_NONE_MATCH, LINK, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::fetcher::{Enrichment, FetchError, MetadataFetcher, Page, PageRequest, PageResponse};
use crate::config::SEARCH_RESULT_CEILING;
use crate::ratelimit::{FreshnessToken, QuotaSnapshot};
use crate::types::{RepoId, RepositoryRecord};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GitHubFetcher {
    client: Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    full_name: String,
    html_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    open_issues_count: u64,
    #[serde(default)]
    license: Option<LicenseItem>,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    has_discussions: bool,
}

#[derive(Debug, Deserialize)]
struct LicenseItem {
    #[serde(default)]
    spdx_id: Option<String>,
}

impl SearchItem {
    fn into_record(self, fetched_at: DateTime<Utc>) -> Result<RepositoryRecord, FetchError> {
        let id = RepoId::parse(&self.full_name).map_err(|e| FetchError::Transient {
            status: None,
            message: e.to_string(),
        })?;

        let mut record = RepositoryRecord::new(id, fetched_at);
        record.url = self.html_url;
        record.description = self.description.unwrap_or_default();
        record.license = self.license.and_then(|l| l.spdx_id);
        record.stars = self.stargazers_count;
        record.forks = self.forks_count;
        record.open_issues = self.open_issues_count;
        // REST only exposes whether discussions are enabled
        record.discussions = Some(u64::from(self.has_discussions));
        record.last_commit = self.pushed_at;
        record.topics = self.topics.into_iter().map(|t| t.to_lowercase()).collect();
        Ok(record)
    }
}

impl GitHubFetcher {
    pub fn new(token: Option<String>) -> Result<Self, FetchError> {
        Self::with_api_base(DEFAULT_API_BASE, token)
    }

    pub fn with_api_base(api_base: impl Into<String>, token: Option<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Rejected {
                status: 0,
                message: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(GitHubFetcher {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("curation-core/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, FetchError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let message = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &headers, message, Utc::now()))
    }

    /// Length of the first page of a listing (capped at 100, like the search),
    /// with the quota reported alongside it.
    async fn first_page_len(&self, url: &str) -> Result<(u64, Option<QuotaSnapshot>), FetchError> {
        let response = self.send(self.get(url)).await?;
        let quota = parse_quota(response.headers());
        let items: Vec<serde_json::Value> = response.json().await.map_err(transport_error)?;
        Ok((items.len() as u64, quota))
    }
}

#[async_trait]
impl MetadataFetcher for GitHubFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError> {
        let url = format!("{}/search/repositories", self.api_base);
        let per_page = request.per_page.to_string();
        let page = request.page.to_string();
        let mut builder = self.get(&url).query(&[
            ("q", request.query.as_str()),
            ("per_page", per_page.as_str()),
            ("page", page.as_str()),
        ]);
        if let Some(token) = &request.freshness {
            builder = builder.header(IF_NONE_MATCH, token.as_str());
        }

        let response = self.send(builder).await?;
        let headers = response.headers().clone();
        let quota = parse_quota(&headers);

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(PageResponse::NotModified { quota });
        }

        let freshness = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(FreshnessToken::new);

        let body: SearchResponse = response.json().await.map_err(transport_error)?;
        let fetched_at = Utc::now();
        let records = body
            .items
            .into_iter()
            .map(|item| item.into_record(fetched_at))
            .collect::<Result<Vec<_>, _>>()?;

        let served = u64::from(request.page) * u64::from(request.per_page);
        let bound = body
            .total_count
            .map(|t| t.min(u64::from(SEARCH_RESULT_CEILING)));
        let has_next = match link_has_next(&headers) {
            Some(next) => next,
            None => bound.is_some_and(|b| served < b),
        };

        debug!(query = %request.query, page = request.page, records = records.len(), has_next, "search page received");
        Ok(PageResponse::Fresh {
            page: Page {
                records,
                has_next,
                total_count: body.total_count,
            },
            freshness,
            quota,
        })
    }

    fn enrich_cost(&self) -> u32 {
        2
    }

    async fn enrich(&self, record: RepositoryRecord) -> Result<Enrichment, FetchError> {
        let repo_url = format!("{}/repos/{}/{}", self.api_base, record.id.owner(), record.id.name());

        let (prs, _) = self
            .first_page_len(&format!("{repo_url}/pulls?state=open&per_page=100"))
            .await?;
        let (contributors, quota) = self
            .first_page_len(&format!("{repo_url}/contributors?per_page=100"))
            .await?;

        Ok(Enrichment {
            record: RepositoryRecord {
                open_prs: Some(prs),
                contributors: Some(contributors),
                ..record
            },
            quota,
        })
    }
}

fn transport_error(e: reqwest::Error) -> FetchError {
    FetchError::Transient {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// `x-ratelimit-*` headers as a snapshot.
pub fn parse_quota(headers: &HeaderMap) -> Option<QuotaSnapshot> {
    let remaining = header_u64(headers, "x-ratelimit-remaining")?;
    let reset = header_u64(headers, "x-ratelimit-reset")?;
    let reset_at = Utc.timestamp_opt(i64::try_from(reset).ok()?, 0).single()?;
    Some(QuotaSnapshot {
        limit: header_u64(headers, "x-ratelimit-limit").and_then(|l| u32::try_from(l).ok()),
        remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        reset_at,
    })
}

/// `Some(true)` when the `Link` header advertises `rel="next"`, `None` when
/// there is no `Link` header at all.
pub fn link_has_next(headers: &HeaderMap) -> Option<bool> {
    let link = headers.get(LINK)?.to_str().ok()?;
    Some(
        link.split(',')
            .any(|part| part.split(';').skip(1).any(|p| p.trim() == r#"rel="next""#)),
    )
}

/// Map a non-success response onto the fetch error taxonomy.
pub fn classify_failure(
    status: StatusCode,
    headers: &HeaderMap,
    message: String,
    now: DateTime<Utc>,
) -> FetchError {
    let quota_spent = header_u64(headers, "x-ratelimit-remaining") == Some(0);
    let limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && (quota_spent || headers.contains_key(RETRY_AFTER)));

    if limited {
        let retry_after = header_u64(headers, RETRY_AFTER.as_str())
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now + chrono::Duration::seconds(secs));
        let reset_at = retry_after
            .or_else(|| parse_quota(headers).map(|q| q.reset_at))
            .unwrap_or_else(|| now + chrono::Duration::seconds(60));
        return FetchError::QuotaExhausted { reset_at };
    }

    if status.is_server_error() {
        FetchError::Transient {
            status: Some(status.as_u16()),
            message,
        }
    } else {
        FetchError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}
