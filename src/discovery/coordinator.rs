use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fetcher::{
    cache_key, FetchError, MetadataFetcher, Page, PageRequest, PageResponse, PartialDiscovery, CANCELLED,
};
use super::query::QuerySpec;
use crate::config::SearchConfig;
use crate::ratelimit::{FetchContext, RateLimitError};
use crate::types::RepositoryRecord;

/// Knobs for one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub per_page: u32,
    /// Results the host will serve per variant.
    pub max_results: u32,
    /// Unique repositories kept per cycle.
    pub limit: Option<usize>,
    pub parallelism: usize,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub enrich: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from_search(&SearchConfig::default())
    }
}

impl DiscoveryOptions {
    pub fn from_search(search: &SearchConfig) -> Self {
        DiscoveryOptions {
            per_page: search.per_page,
            max_results: search.max_results,
            limit: search.limit,
            parallelism: search.parallelism,
            max_attempts: search.max_attempts,
            retry_base: search.retry_base(),
            enrich: search.enrich,
        }
    }

    fn variant_ceiling(&self) -> usize {
        let ceiling = self.max_results as usize;
        self.limit.map_or(ceiling, |limit| ceiling.min(limit))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Deduplicated snapshots from every variant, in variant order, plus the
/// pages that could not be fetched.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    pub records: Vec<RepositoryRecord>,
    pub warnings: Vec<PartialDiscovery>,
    pub pages_fetched: usize,
    pub duplicates: usize,
}

impl DiscoveryOutcome {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Default)]
struct VariantOutcome {
    records: Vec<RepositoryRecord>,
    warnings: Vec<PartialDiscovery>,
    pages_fetched: usize,
}

/// Drives paginated searches through the rate limiter and cache.
///
/// Variants may run concurrently, but results are merged in declaration
/// order, so "first seen" is the same whatever finishes first.
pub struct DiscoveryCoordinator<'a, F> {
    fetcher: &'a F,
    ctx: &'a FetchContext,
    options: DiscoveryOptions,
}

impl<'a, F> DiscoveryCoordinator<'a, F>
where
    F: MetadataFetcher,
{
    pub fn new(fetcher: &'a F, ctx: &'a FetchContext, options: DiscoveryOptions) -> Self {
        Self {
            fetcher,
            ctx,
            options,
        }
    }

    pub async fn discover(&self, spec: &QuerySpec, cancel: &CancellationToken) -> DiscoveryOutcome {
        let variants = spec.variants();
        info!(variants = variants.len(), parallelism = self.options.parallelism, "starting discovery");

        let results: Vec<VariantOutcome> = stream::iter(variants.iter())
            .map(|query| self.run_variant(query, cancel))
            .buffered(self.options.parallelism.max(1))
            .collect()
            .await;

        let mut outcome = DiscoveryOutcome::default();
        let mut seen = HashSet::new();
        let limit = self.options.limit.unwrap_or(usize::MAX);

        for variant in results {
            outcome.warnings.extend(variant.warnings);
            outcome.pages_fetched += variant.pages_fetched;
            for record in variant.records {
                if !seen.insert(record.id.clone()) {
                    // first sighting wins even if later metadata differs
                    outcome.duplicates += 1;
                    continue;
                }
                if outcome.records.len() < limit {
                    outcome.records.push(record);
                }
            }
        }

        if self.options.enrich && self.fetcher.enrich_cost() > 0 {
            let (records, warnings) = self.enrich_all(outcome.records, cancel).await;
            outcome.records = records;
            outcome.warnings.extend(warnings);
        }

        info!(
            records = outcome.records.len(),
            duplicates = outcome.duplicates,
            pages = outcome.pages_fetched,
            partial = outcome.is_partial(),
            "discovery finished"
        );
        outcome
    }

    async fn run_variant(&self, query: &str, cancel: &CancellationToken) -> VariantOutcome {
        let ceiling = self.options.variant_ceiling();
        let per_page = self.options.per_page.max(1);
        let mut outcome = VariantOutcome::default();
        let mut known_total: Option<u64> = None;
        let mut page = 1u32;

        loop {
            if outcome.records.len() >= ceiling {
                break;
            }
            let offset = u64::from(page - 1) * u64::from(per_page);
            if offset >= u64::from(self.options.max_results) {
                debug!(query, page, "result ceiling reached");
                break;
            }
            if cancel.is_cancelled() {
                outcome.warnings.push(PartialDiscovery::cancelled(query, page));
                break;
            }

            match self.fetch_page(query, page, cancel).await {
                Ok(fetched) => {
                    outcome.pages_fetched += 1;
                    known_total = fetched.total_count.or(known_total);
                    let done = !fetched.has_next || fetched.records.is_empty();
                    outcome.records.extend(fetched.records);
                    if done {
                        break;
                    }
                }
                Err(partial) => {
                    warn!(query, page, attempts = partial.attempts, reason = %partial.reason, "page skipped");
                    let cancelled = cancel.is_cancelled();
                    outcome.warnings.push(partial);
                    // later pages are only reachable when the total says they exist
                    let fetched_through = u64::from(page) * u64::from(per_page);
                    let reachable = known_total
                        .map(|total| total.min(u64::from(self.options.max_results)))
                        .is_some_and(|bound| fetched_through < bound);
                    if cancelled || !reachable {
                        break;
                    }
                }
            }
            page += 1;
        }

        outcome.records.truncate(ceiling);
        outcome
    }

    /// One page through limiter and cache, retrying transient failures.
    async fn fetch_page(
        &self,
        query: &str,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<Page, PartialDiscovery> {
        let per_page = self.options.per_page;
        let key = cache_key(query, page, per_page);
        let partial = |attempts: u32, reason: String| PartialDiscovery {
            query: query.to_string(),
            page,
            attempts,
            reason,
        };

        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(partial(attempts, CANCELLED.to_string()));
            }
            self.ctx
                .limiter
                .acquire(1, cancel)
                .await
                .map_err(|e| partial(attempts, limiter_reason(&e)))?;
            if cancel.is_cancelled() {
                return Err(partial(attempts, CANCELLED.to_string()));
            }

            let freshness = self.ctx.cache.freshness(&key);
            let request = PageRequest {
                query: query.to_string(),
                page,
                per_page,
                freshness: freshness.clone(),
            };

            let error = match self.fetcher.fetch_page(&request).await {
                Ok(response) => {
                    if let Some(quota) = response.quota() {
                        self.ctx.limiter.observe(quota);
                    }
                    match response {
                        PageResponse::Fresh {
                            page: fetched,
                            freshness: token,
                            ..
                        } => {
                            if let Some(token) = token {
                                self.ctx.cache.store(key.clone(), fetched.clone(), token);
                            }
                            debug!(query, page, records = fetched.records.len(), "page fetched");
                            return Ok(fetched);
                        }
                        PageResponse::NotModified { .. } => {
                            let cached = freshness
                                .as_ref()
                                .and_then(|token| self.ctx.cache.lookup(&key, token));
                            if let Some(cached) = cached {
                                debug!(query, page, "page unchanged, served from cache");
                                return Ok(cached.restamped(Utc::now()));
                            }
                            self.ctx.cache.invalidate(&key);
                            FetchError::Transient {
                                status: Some(304),
                                message: "not modified but no cached copy".to_string(),
                            }
                        }
                    }
                }
                Err(e) => e,
            };

            match error {
                FetchError::QuotaExhausted { reset_at } if reset_at > Utc::now() => {
                    // authoritative wait; does not spend an attempt
                    info!(query, page, %reset_at, "quota exhausted, backing off until reset");
                    self.ctx.limiter.exhausted(reset_at);
                }
                FetchError::Rejected { .. } => {
                    return Err(partial(attempts + 1, error.to_string()));
                }
                transient => {
                    attempts += 1;
                    if attempts >= self.options.max_attempts {
                        return Err(partial(attempts, transient.to_string()));
                    }
                    let delay = self.options.backoff(attempts);
                    debug!(query, page, attempts, delay_ms = delay.as_millis() as u64, error = %transient, "retrying page");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(partial(attempts, CANCELLED.to_string())),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Enrich every record, keeping the search snapshot and a warning for
    /// each one that could not be enriched.
    async fn enrich_all(
        &self,
        records: Vec<RepositoryRecord>,
        cancel: &CancellationToken,
    ) -> (Vec<RepositoryRecord>, Vec<PartialDiscovery>) {
        let cost = self.fetcher.enrich_cost();
        let results: Vec<(RepositoryRecord, Option<PartialDiscovery>)> = stream::iter(records)
            .map(|record| async move {
                if cancel.is_cancelled() {
                    let warning = PartialDiscovery::enrichment(&record.id, 0, CANCELLED);
                    return (record, Some(warning));
                }
                if let Err(e) = self.ctx.limiter.acquire(cost, cancel).await {
                    warn!(repo = %record.id, error = %e, "enrichment skipped");
                    let warning = PartialDiscovery::enrichment(&record.id, 0, limiter_reason(&e));
                    return (record, Some(warning));
                }
                let fallback = record.clone();
                match self.fetcher.enrich(record).await {
                    Ok(enriched) => {
                        if let Some(quota) = &enriched.quota {
                            self.ctx.limiter.observe(quota);
                        }
                        (enriched.record, None)
                    }
                    Err(e) => {
                        if let FetchError::QuotaExhausted { reset_at } = &e {
                            self.ctx.limiter.exhausted(*reset_at);
                        }
                        warn!(repo = %fallback.id, error = %e, "enrichment failed, keeping search metrics");
                        let warning = PartialDiscovery::enrichment(&fallback.id, 1, e.to_string());
                        (fallback, Some(warning))
                    }
                }
            })
            .buffered(self.options.parallelism.max(1))
            .collect()
            .await;

        let mut warnings = Vec::new();
        let records = results
            .into_iter()
            .map(|(record, warning)| {
                warnings.extend(warning);
                record
            })
            .collect();
        (records, warnings)
    }
}

fn limiter_reason(error: &RateLimitError) -> String {
    match error {
        RateLimitError::Cancelled => CANCELLED.to_string(),
        other => other.to_string(),
    }
}
