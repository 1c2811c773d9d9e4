use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ratelimit::{FreshnessToken, QuotaSnapshot};
use crate::types::{RepoId, RepositoryRecord};

/// Reason recorded when cancellation stopped a fetch.
pub const CANCELLED: &str = "cancelled";

/// One page request for one query variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: String,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
    /// Validator of the cached copy, sent as a conditional request.
    pub freshness: Option<FreshnessToken>,
}

impl PageRequest {
    pub fn cache_key(&self) -> String {
        cache_key(&self.query, self.page, self.per_page)
    }
}

pub(crate) fn cache_key(query: &str, page: u32, per_page: u32) -> String {
    format!("search?q={query}&page={page}&per_page={per_page}")
}

/// Repository snapshots on one page plus pagination state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<RepositoryRecord>,
    pub has_next: bool,
    /// Total matches the host reports for the query, when it does.
    #[serde(default)]
    pub total_count: Option<u64>,
}

impl Page {
    /// The same page observed again at `at`.
    pub fn restamped(&self, at: DateTime<Utc>) -> Self {
        Page {
            records: self.records.iter().map(|r| r.restamped(at)).collect(),
            has_next: self.has_next,
            total_count: self.total_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageResponse {
    Fresh {
        page: Page,
        freshness: Option<FreshnessToken>,
        quota: Option<QuotaSnapshot>,
    },
    /// The conditional request matched; the cached copy is current.
    NotModified { quota: Option<QuotaSnapshot> },
}

impl PageResponse {
    pub fn quota(&self) -> Option<&QuotaSnapshot> {
        match self {
            PageResponse::Fresh { quota, .. } | PageResponse::NotModified { quota } => quota.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Network failure or 5xx; retried with backoff.
    #[error("transient fetch failure (status {status:?}): {message}")]
    Transient { status: Option<u16>, message: String },

    /// The host refused for quota. Not a failure: the limiter waits for the reset.
    #[error("quota exhausted until {reset_at}")]
    QuotaExhausted { reset_at: DateTime<Utc> },

    /// Non-retryable refusal (bad query, auth).
    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// An enriched snapshot and the quota the host reported while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub record: RepositoryRecord,
    pub quota: Option<QuotaSnapshot>,
}

/// The metadata host as seen by the coordinator.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError>;

    /// Outbound calls one [`MetadataFetcher::enrich`] spends.
    fn enrich_cost(&self) -> u32 {
        0
    }

    /// Fill metrics the search listing does not carry. Returns a new snapshot.
    async fn enrich(&self, record: RepositoryRecord) -> Result<Enrichment, FetchError> {
        Ok(Enrichment { record, quota: None })
    }
}

/// A page (or the tail of a variant) that could not be fetched. The cycle
/// continues with what it has; callers must treat the result as incomplete.
///
/// Enrichment gaps use the query `enrich <owner/name>` and page 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDiscovery {
    pub query: String,
    pub page: u32,
    pub attempts: u32,
    pub reason: String,
}

impl PartialDiscovery {
    pub fn cancelled(query: &str, page: u32) -> Self {
        PartialDiscovery {
            query: query.to_string(),
            page,
            attempts: 0,
            reason: CANCELLED.to_string(),
        }
    }

    /// An enrichment call that did not complete; the search snapshot was kept.
    pub fn enrichment(id: &RepoId, attempts: u32, reason: impl Into<String>) -> Self {
        PartialDiscovery {
            query: format!("enrich {id}"),
            page: 0,
            attempts,
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason == CANCELLED
    }
}

impl fmt::Display for PartialDiscovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "query {:?} page {} incomplete after {} attempt(s): {}",
            self.query, self.page, self.attempts, self.reason
        )
    }
}
