//! Outbound request budget and response memoization shared by one cycle.

pub mod cache;
pub mod limiter;

use std::sync::Arc;
use std::time::Duration;

pub use cache::{CacheError, FreshnessToken, ResponseCache};
pub use limiter::{QuotaSnapshot, RateLimitError, RateLimiter};

use crate::discovery::Page;

/// Per-cycle fetch context: a fresh quota tracker plus the (possibly
/// long-lived) page cache.
///
/// Built explicitly at cycle start and handed to the discovery coordinator;
/// nothing about quota survives into the next cycle.
#[derive(Debug)]
pub struct FetchContext {
    pub limiter: RateLimiter,
    pub cache: Arc<ResponseCache<Page>>,
}

impl FetchContext {
    pub fn new(max_quota_wait: Duration) -> Self {
        Self::with_cache(max_quota_wait, Arc::new(ResponseCache::new()))
    }

    pub fn with_cache(max_quota_wait: Duration, cache: Arc<ResponseCache<Page>>) -> Self {
        FetchContext {
            limiter: RateLimiter::new(max_quota_wait),
            cache,
        }
    }
}
