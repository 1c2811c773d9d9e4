use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::CuratorConfig;
use crate::types::{CategorizedRecord, RepoId};

use super::document::{ArchivedEntry, Partition, RankedListDocument, DOCUMENT_SCHEMA_VERSION};
use super::summary::{AddedEntry, ChangeSummary, EntryChange, RemovedEntry, SCORE_EPSILON};

/// What happens to a repository that was listed but is no longer discovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovedPolicy {
    /// Drop it from the list and report it in the change summary.
    #[default]
    Report,
    /// Move it to the document's archive section.
    Archive,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("repository {0} appears more than once in the merge input")]
    DuplicateRepository(RepoId),
    #[error("cannot serialize ranked list: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Declared categories; their partitions come first, in this order.
    pub category_order: Vec<String>,
    /// Catch-all partition for records matching no category. `None` leaves
    /// such records out of the list.
    pub uncategorized: Option<String>,
    /// Records scoring below this are left out of the list.
    pub min_score: Option<f64>,
    pub removed: RemovedPolicy,
    pub generated_at: DateTime<Utc>,
}

impl MergeOptions {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        MergeOptions {
            category_order: Vec::new(),
            uncategorized: None,
            min_score: None,
            removed: RemovedPolicy::Report,
            generated_at,
        }
    }

    pub fn from_config(config: &CuratorConfig, generated_at: DateTime<Utc>) -> Self {
        MergeOptions {
            category_order: config
                .category_definitions()
                .iter()
                .map(|d| d.name.trim().to_string())
                .collect(),
            uncategorized: config.output.uncategorized.clone(),
            min_score: config.output.min_score,
            removed: config.output.removed,
            generated_at,
        }
    }

    pub fn with_category_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.category_order = order.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_uncategorized(mut self, name: impl Into<String>) -> Self {
        self.uncategorized = Some(name.into());
        self
    }

    pub fn with_min_score(mut self, min: f64) -> Self {
        self.min_score = Some(min);
        self
    }

    pub fn with_removed(mut self, policy: RemovedPolicy) -> Self {
        self.removed = policy;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: RankedListDocument,
    pub summary: ChangeSummary,
}

/// Rank order within a partition: score descending, then stars descending,
/// then id ascending. Total, so output never depends on input order.
pub fn rank_order(a: &CategorizedRecord, b: &CategorizedRecord) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| b.record().stars.cmp(&a.record().stars))
        .then_with(|| a.id().cmp(b.id()))
}

/// Build the next ranked list from `records` and diff it against `previous`.
/// `previous` is only read.
pub fn merge(
    previous: &RankedListDocument,
    records: Vec<CategorizedRecord>,
    options: &MergeOptions,
) -> Result<MergeOutcome, MergeError> {
    // 1. Reject duplicate input ids
    let mut ids: Vec<&RepoId> = records.iter().map(|r| r.id()).collect();
    ids.sort();
    if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
        return Err(MergeError::DuplicateRepository(w[0].clone()));
    }

    // 2. Score floor
    let considered = records.len();
    let records: Vec<CategorizedRecord> = match options.min_score {
        Some(min) => records
            .into_iter()
            .filter(|r| {
                let keep = r.score() >= min;
                if !keep {
                    debug!(repo = %r.id(), score = r.score(), min, "below score floor");
                }
                keep
            })
            .collect(),
        None => records,
    };

    // 3. Partition
    let mut buckets: BTreeMap<String, Vec<CategorizedRecord>> = BTreeMap::new();
    for record in records {
        if record.categories.is_empty() {
            if let Some(name) = &options.uncategorized {
                buckets.entry(name.clone()).or_default().push(record);
            }
            continue;
        }
        let mut seen = BTreeSet::new();
        for category in &record.categories {
            if seen.insert(category.as_str()) {
                buckets.entry(category.clone()).or_default().push(record.clone());
            }
        }
    }

    // 4. Rank each partition
    for entries in buckets.values_mut() {
        entries.sort_by(rank_order);
        debug_assert!(entries
            .windows(2)
            .all(|w| rank_order(&w[0], &w[1]) == Ordering::Less));
    }

    // 5. Order partitions: declared, then undeclared by name, then catch-all
    let mut partitions = Vec::with_capacity(buckets.len());
    for name in &options.category_order {
        if let Some(entries) = buckets.remove(name) {
            partitions.push(Partition {
                category: name.clone(),
                entries,
            });
        }
    }
    let catch_all = options
        .uncategorized
        .as_ref()
        .and_then(|name| buckets.remove_entry(name));
    partitions.extend(
        buckets
            .into_iter()
            .map(|(category, entries)| Partition { category, entries }),
    );
    if let Some((category, entries)) = catch_all {
        partitions.push(Partition { category, entries });
    }

    let mut document = RankedListDocument {
        schema_version: DOCUMENT_SCHEMA_VERSION,
        generated_at: Some(options.generated_at),
        weights_version: partitions
            .iter()
            .flat_map(|p| p.entries.first())
            .map(|e| e.scored.weights_version.clone())
            .next(),
        previous_hash: None,
        partitions,
        archived: Vec::new(),
    };

    // 6. Diff against the previous list
    let before: HashMap<RepoId, &CategorizedRecord> = previous
        .entries()
        .map(|e| (e.id().clone(), e))
        .collect();
    let after: HashMap<RepoId, CategorizedRecord> = document
        .entries()
        .map(|e| (e.id().clone(), e.clone()))
        .collect();

    let mut added = Vec::new();
    let mut changed = Vec::new();
    let mut refreshed = Vec::new();
    for (id, now) in &after {
        match before.get(id) {
            None => added.push(AddedEntry {
                id: id.clone(),
                score: now.score(),
                categories: now.categories.clone(),
            }),
            Some(was) => {
                let delta = now.score() - was.score();
                if delta.abs() > SCORE_EPSILON || was.categories != now.categories {
                    changed.push(EntryChange {
                        id: id.clone(),
                        score_before: was.score(),
                        score_after: now.score(),
                        score_delta: delta,
                        categories_before: was.categories.clone(),
                        categories_after: now.categories.clone(),
                    });
                } else if !was.record().same_metadata(now.record()) {
                    refreshed.push(id.clone());
                }
            }
        }
    }

    let archive = options.removed == RemovedPolicy::Archive;
    let mut removed = Vec::new();
    let mut newly_archived = Vec::new();
    for (id, was) in &before {
        if after.contains_key(id) {
            continue;
        }
        removed.push(RemovedEntry {
            id: id.clone(),
            last_score: was.score(),
            last_categories: was.categories.clone(),
            archived: archive,
        });
        if archive {
            newly_archived.push(ArchivedEntry {
                entry: (*was).clone(),
                archived_at: options.generated_at,
            });
        }
    }

    // 7. Archive: carried entries not relisted, plus this cycle's removals
    if archive {
        let mut archived: Vec<ArchivedEntry> = previous
            .archived
            .iter()
            .filter(|a| !after.contains_key(a.entry.id()))
            .cloned()
            .collect();
        archived.extend(newly_archived);
        archived.sort_by(|a, b| a.entry.id().cmp(b.entry.id()));
        archived.dedup_by(|a, b| a.entry.id() == b.entry.id());
        document.archived = archived;
    }

    let previous_hash = if previous.is_empty() {
        None
    } else {
        Some(previous.content_hash()?)
    };
    document.previous_hash = previous_hash.clone();
    let current_hash = document.content_hash()?;

    let reordered = previous.layout() != document.layout();
    let summary = ChangeSummary::new(previous_hash, current_hash, added, removed, changed)
        .with_refreshed(refreshed)
        .with_reordered(reordered);
    info!(
        considered,
        listed = after.len(),
        added = summary.added.len(),
        removed = summary.removed.len(),
        changed = summary.changed.len(),
        refreshed = summary.refreshed.len(),
        reordered,
        noop = summary.is_noop(),
        "merged ranked list"
    );

    Ok(MergeOutcome { document, summary })
}

/// Categorized records of a document with fresh categories, for re-running
/// rules without discovery. Scores are kept.
pub fn relisted(
    document: &RankedListDocument,
    categorize: impl Fn(&CategorizedRecord) -> Vec<String>,
) -> Vec<CategorizedRecord> {
    document
        .entries()
        .map(|e| CategorizedRecord {
            scored: e.scored.clone(),
            categories: categorize(e),
        })
        .collect()
}
