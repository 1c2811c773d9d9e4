use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use curation_core::discovery::{
    DiscoveryCoordinator, DiscoveryOptions, Enrichment, FetchError, MetadataFetcher, Page, PageRequest,
    PageResponse, QuerySpec, CANCELLED,
};
use curation_core::ratelimit::{FetchContext, FreshnessToken, QuotaSnapshot, ResponseCache};
use curation_core::types::{RepoId, RepositoryRecord};

fn make_record(full_name: &str, stars: u64) -> RepositoryRecord {
    let fetched_at = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let mut record = RepositoryRecord::new(RepoId::parse(full_name).unwrap(), fetched_at);
    record.stars = stars;
    record
}

/// `per_page` records named `<owner>/p<page>-<i>`.
fn make_page(owner: &str, page: u32, per_page: u32, has_next: bool, total: Option<u64>) -> Page {
    Page {
        records: (0..per_page)
            .map(|i| make_record(&format!("{owner}/p{page}-{i}"), 1))
            .collect(),
        has_next,
        total_count: total,
    }
}

/// Serves canned pages; scripted responses for a page are served first.
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<(String, u32), Page>,
    scripted: Mutex<HashMap<(String, u32), VecDeque<Result<PageResponse, FetchError>>>>,
    always_fail: HashSet<(String, u32)>,
    etags: bool,
    cancel_on: Option<(String, u32, CancellationToken)>,
    enrich_cost: u32,
    enrich_failures: HashSet<String>,
    enrich_quota: Option<QuotaSnapshot>,
    calls: Mutex<Vec<PageRequest>>,
}

impl ScriptedFetcher {
    fn with_page(mut self, query: &str, number: u32, page: Page) -> Self {
        self.pages.insert((query.to_string(), number), page);
        self
    }

    fn then(self, query: &str, number: u32, response: Result<PageResponse, FetchError>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .entry((query.to_string(), number))
            .or_default()
            .push_back(response);
        self
    }

    fn failing(mut self, query: &str, number: u32) -> Self {
        self.always_fail.insert((query.to_string(), number));
        self
    }

    fn calls_for(&self, query: &str, number: u32) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.query == query && r.page == number)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn transient() -> FetchError {
    FetchError::Transient {
        status: Some(502),
        message: "bad gateway".to_string(),
    }
}

#[async_trait]
impl MetadataFetcher for ScriptedFetcher {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        let key = (request.query.clone(), request.page);

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }
        if self.always_fail.contains(&key) {
            return Err(transient());
        }
        if let Some((query, number, token)) = &self.cancel_on {
            if *query == request.query && *number == request.page {
                token.cancel();
            }
        }

        let page = self.pages.get(&key).cloned().unwrap_or(Page {
            records: Vec::new(),
            has_next: false,
            total_count: None,
        });
        let etag = FreshnessToken::new(format!("etag-{}-{}", request.query, request.page));
        if self.etags && request.freshness.as_ref() == Some(&etag) {
            return Ok(PageResponse::NotModified { quota: None });
        }
        Ok(PageResponse::Fresh {
            page,
            freshness: self.etags.then_some(etag),
            quota: None,
        })
    }

    fn enrich_cost(&self) -> u32 {
        self.enrich_cost
    }

    async fn enrich(&self, mut record: RepositoryRecord) -> Result<Enrichment, FetchError> {
        if self.enrich_failures.contains(record.id.key()) {
            return Err(transient());
        }
        record.contributors = Some(7);
        Ok(Enrichment {
            record,
            quota: self.enrich_quota,
        })
    }
}

fn options(per_page: u32) -> DiscoveryOptions {
    DiscoveryOptions {
        per_page,
        retry_base: Duration::from_millis(10),
        ..DiscoveryOptions::default()
    }
}

fn context() -> FetchContext {
    FetchContext::new(Duration::from_secs(3600))
}

/// A token that cancels itself after `after` of (virtual) time.
fn cancel_after(after: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn duplicates_across_variants_keep_the_first_sighting() {
    let spec = QuerySpec::new("health").with_topics(["fhir", "telemedicine"]);
    let fetcher = ScriptedFetcher::default()
        .with_page(
            "health topic:fhir",
            1,
            Page {
                records: vec![make_record("acme/shared", 10), make_record("acme/fhir-only", 1)],
                has_next: false,
                total_count: Some(2),
            },
        )
        .with_page(
            "health topic:telemedicine",
            1,
            Page {
                records: vec![make_record("ACME/Shared", 99), make_record("acme/tele-only", 1)],
                has_next: false,
                total_count: Some(2),
            },
        );

    for parallelism in [1, 2] {
        let ctx = context();
        let coordinator = DiscoveryCoordinator::new(
            &fetcher,
            &ctx,
            DiscoveryOptions {
                parallelism,
                ..options(100)
            },
        );
        let outcome = coordinator.discover(&spec, &CancellationToken::new()).await;

        let names: Vec<String> = outcome.records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(names, vec!["acme/shared", "acme/fhir-only", "acme/tele-only"]);
        assert_eq!(outcome.records[0].stars, 10, "first sighting wins");
        assert_eq!(outcome.duplicates, 1);
        assert!(!outcome.is_partial());
    }
}

#[tokio::test(start_paused = true)]
async fn failed_middle_page_yields_partial_discovery() {
    let query = "health";
    let mut fetcher = ScriptedFetcher::default().failing(query, 3);
    for number in 1..=5 {
        fetcher = fetcher.with_page(query, number, make_page("acme", number, 2, number < 5, Some(10)));
    }
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(&fetcher, &ctx, options(2));

    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    let names: Vec<String> = outcome.records.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(
        names,
        vec![
            "acme/p1-0", "acme/p1-1", "acme/p2-0", "acme/p2-1", "acme/p4-0", "acme/p4-1",
            "acme/p5-0", "acme/p5-1",
        ]
    );
    assert!(outcome.is_partial());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].page, 3);
    assert_eq!(outcome.warnings[0].attempts, 3);
    assert_eq!(outcome.warnings[0].query, query);
    assert_eq!(fetcher.calls_for(query, 3), 3);
    assert_eq!(outcome.pages_fetched, 4);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_exponential_backoff() {
    let query = "health";
    let fetcher = ScriptedFetcher::default()
        .with_page(query, 1, make_page("acme", 1, 2, false, Some(2)))
        .then(query, 1, Err(transient()))
        .then(query, 1, Err(transient()));
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(&fetcher, &ctx, options(2));

    let started = tokio::time::Instant::now();
    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    assert_eq!(outcome.records.len(), 2);
    assert!(!outcome.is_partial());
    assert_eq!(fetcher.calls_for(query, 1), 3);
    // 10ms then 20ms
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn rejected_requests_are_not_retried() {
    let query = "bad query";
    let fetcher = ScriptedFetcher::default().then(
        query,
        1,
        Err(FetchError::Rejected {
            status: 422,
            message: "validation failed".to_string(),
        }),
    );
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(&fetcher, &ctx, options(100));

    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].attempts, 1);
    assert!(outcome.warnings[0].reason.contains("422"));
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn spent_quota_blocks_until_reported_reset() {
    let query = "health";
    let reset_at = Utc::now() + chrono::Duration::seconds(120);
    let fetcher = ScriptedFetcher::default()
        .then(
            query,
            1,
            Ok(PageResponse::Fresh {
                page: make_page("acme", 1, 2, true, Some(4)),
                freshness: None,
                quota: Some(QuotaSnapshot {
                    limit: Some(30),
                    remaining: 0,
                    reset_at,
                }),
            }),
        )
        .with_page(query, 2, make_page("acme", 2, 2, false, Some(4)));
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(&fetcher, &ctx, options(2));

    let started = tokio::time::Instant::now();
    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    assert_eq!(outcome.records.len(), 4);
    assert!(!outcome.is_partial());
    assert!(started.elapsed() >= Duration::from_secs(100));
}

#[tokio::test(start_paused = true)]
async fn quota_refusal_waits_without_spending_attempts() {
    let query = "health";
    let fetcher = ScriptedFetcher::default()
        .then(
            query,
            1,
            Err(FetchError::QuotaExhausted {
                reset_at: Utc::now() + chrono::Duration::seconds(60),
            }),
        )
        .with_page(query, 1, make_page("acme", 1, 2, false, Some(2)));
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(
        &fetcher,
        &ctx,
        DiscoveryOptions {
            max_attempts: 1,
            ..options(2)
        },
    );

    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    assert_eq!(outcome.records.len(), 2);
    assert!(!outcome.is_partial());
    assert_eq!(fetcher.calls_for(query, 1), 2);
}

#[tokio::test]
async fn quota_reset_beyond_max_wait_is_partial() {
    let query = "health";
    let fetcher = ScriptedFetcher::default().then(
        query,
        1,
        Err(FetchError::QuotaExhausted {
            reset_at: Utc::now() + chrono::Duration::hours(2),
        }),
    );
    let ctx = FetchContext::new(Duration::from_secs(10));
    let coordinator = DiscoveryCoordinator::new(&fetcher, &ctx, options(2));

    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].reason.contains("longer than"));
    assert_eq!(fetcher.total_calls(), 1);
}

#[tokio::test]
async fn unchanged_pages_are_served_from_cache() {
    let query = "health";
    let fetcher = ScriptedFetcher {
        etags: true,
        ..ScriptedFetcher::default()
    }
    .with_page(query, 1, make_page("acme", 1, 2, false, Some(2)));
    let cache: Arc<ResponseCache<Page>> = Arc::new(ResponseCache::new());

    // 1. Cold run fills the cache
    let cold = FetchContext::with_cache(Duration::from_secs(60), Arc::clone(&cache));
    let first = DiscoveryCoordinator::new(&fetcher, &cold, options(2))
        .discover(&QuerySpec::new(query), &CancellationToken::new())
        .await;
    assert_eq!(cache.len(), 1);

    // 2. Warm run sends the validator and gets "not modified"
    let warm = FetchContext::with_cache(Duration::from_secs(60), Arc::clone(&cache));
    let second = DiscoveryCoordinator::new(&fetcher, &warm, options(2))
        .discover(&QuerySpec::new(query), &CancellationToken::new())
        .await;

    let calls = fetcher.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].freshness.is_none());
    assert_eq!(calls[1].freshness.as_ref().map(|t| t.as_str()), Some("etag-health-1"));

    let ids = |records: &[RepositoryRecord]| records.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&second.records), ids(&first.records));
    assert!(second.records.iter().all(|r| r.fetched_at >= first.records[0].fetched_at));
    assert!(!second.is_partial());
}

#[tokio::test]
async fn cancellation_stops_at_the_next_page_boundary() {
    let query = "health";
    let cancel = CancellationToken::new();
    let mut fetcher = ScriptedFetcher {
        cancel_on: Some((query.to_string(), 2, cancel.clone())),
        ..ScriptedFetcher::default()
    };
    for number in 1..=4 {
        fetcher = fetcher.with_page(query, number, make_page("acme", number, 2, number < 4, Some(8)));
    }
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(&fetcher, &ctx, options(2));

    let outcome = coordinator.discover(&QuerySpec::new(query), &cancel).await;

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(fetcher.total_calls(), 2);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].page, 3);
    assert_eq!(outcome.warnings[0].reason, "cancelled");
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_quota_wait() {
    let query = "health";
    let fetcher = ScriptedFetcher::default()
        .then(
            query,
            1,
            Err(FetchError::QuotaExhausted {
                reset_at: Utc::now() + chrono::Duration::seconds(3000),
            }),
        )
        .with_page(query, 1, make_page("acme", 1, 2, false, Some(2)));
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(&fetcher, &ctx, options(2));
    let cancel = cancel_after(Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    let outcome = coordinator.discover(&QuerySpec::new(query), &cancel).await;

    assert!(started.elapsed() < Duration::from_secs(60));
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].reason, CANCELLED);
    assert_eq!(fetcher.calls_for(query, 1), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_retry_backoff() {
    let query = "health";
    let fetcher = ScriptedFetcher::default().failing(query, 1);
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(
        &fetcher,
        &ctx,
        DiscoveryOptions {
            retry_base: Duration::from_secs(60),
            max_attempts: 5,
            ..options(2)
        },
    );
    let cancel = cancel_after(Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    let outcome = coordinator.discover(&QuerySpec::new(query), &cancel).await;

    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].is_cancelled());
    assert_eq!(outcome.warnings[0].attempts, 1);
    assert_eq!(fetcher.calls_for(query, 1), 1);
}

#[tokio::test]
async fn pagination_stops_at_the_result_ceiling() {
    let query = "health";
    let mut fetcher = ScriptedFetcher::default();
    for number in 1..=10 {
        fetcher = fetcher.with_page(query, number, make_page("acme", number, 2, true, Some(5000)));
    }
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(
        &fetcher,
        &ctx,
        DiscoveryOptions {
            max_results: 4,
            ..options(2)
        },
    );

    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(fetcher.total_calls(), 2);
    assert!(!outcome.is_partial());
}

#[tokio::test]
async fn limit_bounds_unique_records_across_variants() {
    let spec = QuerySpec::new("health").with_topics(["a", "b"]);
    let mut fetcher = ScriptedFetcher::default();
    for (variant, owner) in [("health topic:a", "one"), ("health topic:b", "two")] {
        for number in 1..=3 {
            fetcher = fetcher.with_page(variant, number, make_page(owner, number, 2, number < 3, Some(6)));
        }
    }
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(
        &fetcher,
        &ctx,
        DiscoveryOptions {
            limit: Some(3),
            ..options(2)
        },
    );

    let outcome = coordinator.discover(&spec, &CancellationToken::new()).await;

    let names: Vec<String> = outcome.records.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(names, vec!["one/p1-0", "one/p1-1", "one/p2-0"]);
    assert_eq!(fetcher.calls_for("health topic:a", 3), 0);
}

#[tokio::test]
async fn enrichment_failures_keep_the_search_snapshot() {
    let query = "health";
    let fetcher = ScriptedFetcher {
        enrich_cost: 2,
        enrich_failures: HashSet::from(["acme/p1-1".to_string()]),
        ..ScriptedFetcher::default()
    }
    .with_page(query, 1, make_page("acme", 1, 3, false, Some(3)));
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(
        &fetcher,
        &ctx,
        DiscoveryOptions {
            enrich: true,
            ..options(3)
        },
    );

    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    let contributors: Vec<Option<u64>> = outcome.records.iter().map(|r| r.contributors).collect();
    assert_eq!(contributors, vec![Some(7), None, Some(7)]);

    assert!(outcome.is_partial());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].query, "enrich acme/p1-1");
    assert_eq!(outcome.warnings[0].page, 0);
    assert!(outcome.warnings[0].reason.contains("502"));
}

#[tokio::test]
async fn enrichment_cut_short_by_cancellation_is_reported() {
    let query = "health";
    let cancel = CancellationToken::new();
    let fetcher = ScriptedFetcher {
        enrich_cost: 2,
        cancel_on: Some((query.to_string(), 1, cancel.clone())),
        ..ScriptedFetcher::default()
    }
    .with_page(query, 1, make_page("acme", 1, 2, false, Some(2)));
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(
        &fetcher,
        &ctx,
        DiscoveryOptions {
            enrich: true,
            ..options(2)
        },
    );

    let outcome = coordinator.discover(&QuerySpec::new(query), &cancel).await;

    assert!(outcome.records.iter().all(|r| r.contributors.is_none()));
    let skipped: Vec<&str> = outcome.warnings.iter().map(|w| w.query.as_str()).collect();
    assert_eq!(skipped, vec!["enrich acme/p1-0", "enrich acme/p1-1"]);
    assert!(outcome.warnings.iter().all(|w| w.is_cancelled()));
}

#[tokio::test]
async fn enrichment_responses_update_the_quota() {
    let query = "health";
    let fetcher = ScriptedFetcher {
        enrich_cost: 2,
        enrich_quota: Some(QuotaSnapshot {
            limit: Some(5000),
            remaining: 40,
            reset_at: Utc::now() + chrono::Duration::minutes(30),
        }),
        ..ScriptedFetcher::default()
    }
    .with_page(query, 1, make_page("acme", 1, 2, false, Some(2)));
    let ctx = context();
    let coordinator = DiscoveryCoordinator::new(
        &fetcher,
        &ctx,
        DiscoveryOptions {
            enrich: true,
            ..options(2)
        },
    );

    let outcome = coordinator.discover(&QuerySpec::new(query), &CancellationToken::new()).await;

    assert!(!outcome.is_partial());
    assert_eq!(ctx.limiter.remaining(), Some(40));
}
