//! One scan cycle: discovery, scoring, categorization, merge.
//!
//! The cycle never writes; persisting the outcome is the caller's job, so a
//! dry run and a live run share everything up to the store.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::categorize::{Categorizer, RuleError};
use crate::config::{ConfigError, CuratorConfig};
use crate::discovery::{
    DiscoveryCoordinator, DiscoveryOptions, MetadataFetcher, PartialDiscovery, QuerySpec,
};
use crate::merge::{
    merge, relisted, ChangeSummary, MergeError, MergeOptions, MergeOutcome, RankedListDocument,
};
use crate::ratelimit::FetchContext;
use crate::scoring::WeightedScorer;
use crate::types::CategorizedRecord;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid category rules: {0}")]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Result of one cycle. `warnings` is non-empty when discovery was partial;
/// the list is still complete for everything that was fetched.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub document: RankedListDocument,
    pub summary: ChangeSummary,
    pub warnings: Vec<PartialDiscovery>,
    pub discovered: usize,
}

impl CycleOutput {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run one scan cycle against `previous`.
///
/// Configuration and category rules are checked before the first request.
/// Cancellation stops discovery at the next page boundary, or during a quota
/// or retry wait, and is reported as a partial discovery, not an error. The
/// summary carries the same warnings so persisted output shows the gap.
pub async fn run_cycle<F>(
    config: &CuratorConfig,
    fetcher: &F,
    ctx: &FetchContext,
    previous: &RankedListDocument,
    cancel: &CancellationToken,
    generated_at: DateTime<Utc>,
) -> Result<CycleOutput, CycleError>
where
    F: MetadataFetcher,
{
    // 1. Validate before any API call
    config.validate()?;
    let categorizer = Categorizer::from_config(config)?;
    let scorer = WeightedScorer::new(&config.weights);

    // 2. Discover
    let coordinator =
        DiscoveryCoordinator::new(fetcher, ctx, DiscoveryOptions::from_search(&config.search));
    let outcome = coordinator
        .discover(&QuerySpec::from_search(&config.search), cancel)
        .await;
    for warning in &outcome.warnings {
        warn!(
            query = %warning.query,
            page = warning.page,
            attempts = warning.attempts,
            reason = %warning.reason,
            "partial discovery"
        );
    }
    let discovered = outcome.records.len();

    // 3. Score and categorize
    let records: Vec<CategorizedRecord> = outcome
        .records
        .into_iter()
        .map(|record| categorizer.apply(scorer.score_record(record)))
        .collect();

    // 4. Merge
    let MergeOutcome { document, summary } =
        merge(previous, records, &MergeOptions::from_config(config, generated_at))?;

    info!(
        discovered,
        partial = !outcome.warnings.is_empty(),
        weights = %scorer.weights_version(),
        "cycle complete"
    );

    Ok(CycleOutput {
        document,
        summary: summary.with_warnings(outcome.warnings.clone()),
        warnings: outcome.warnings,
        discovered,
    })
}

/// Re-run category rules over an existing list without discovery. Scores
/// are kept as persisted.
pub fn recategorize(
    document: &RankedListDocument,
    categorizer: &Categorizer,
    options: &MergeOptions,
) -> Result<MergeOutcome, MergeError> {
    let records = relisted(document, |entry| categorizer.categorize(entry.record()));
    merge(document, records, options)
}
