use serde::{Deserialize, Serialize};

use crate::discovery::PartialDiscovery;
use crate::types::{ContentHash, RepoId};

/// Score differences at or below this are not reported.
pub const SCORE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedEntry {
    pub id: RepoId,
    pub score: f64,
    pub categories: Vec<String>,
}

/// Listed before, absent now: deleted, renamed, or outside the query bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedEntry {
    pub id: RepoId,
    pub last_score: f64,
    pub last_categories: Vec<String>,
    /// Kept in the document's archive rather than dropped.
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryChange {
    pub id: RepoId,
    pub score_before: f64,
    pub score_after: f64,
    pub score_delta: f64,
    pub categories_before: Vec<String>,
    pub categories_after: Vec<String>,
}

impl EntryChange {
    pub fn category_moved(&self) -> bool {
        self.categories_before != self.categories_after
    }

    pub fn score_changed(&self) -> bool {
        self.score_delta.abs() > SCORE_EPSILON
    }
}

/// Structural diff between two ranked lists, consumed by update automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub previous_hash: Option<ContentHash>,
    pub current_hash: ContentHash,
    /// True when there is nothing worth proposing.
    pub noop: bool,
    /// Discovery did not complete; removals may only mean "not seen this time".
    #[serde(default)]
    pub partial: bool,
    /// Category or entry order differs from the previous list.
    #[serde(default)]
    pub reordered: bool,
    pub added: Vec<AddedEntry>,
    pub removed: Vec<RemovedEntry>,
    pub changed: Vec<EntryChange>,
    /// Listed metadata changed while score and categories did not.
    #[serde(default)]
    pub refreshed: Vec<RepoId>,
    #[serde(default)]
    pub warnings: Vec<PartialDiscovery>,
}

impl ChangeSummary {
    pub fn new(
        previous_hash: Option<ContentHash>,
        current_hash: ContentHash,
        mut added: Vec<AddedEntry>,
        mut removed: Vec<RemovedEntry>,
        mut changed: Vec<EntryChange>,
    ) -> Self {
        added.sort_by(|a, b| a.id.cmp(&b.id));
        removed.sort_by(|a, b| a.id.cmp(&b.id));
        changed.sort_by(|a, b| a.id.cmp(&b.id));
        let mut summary = ChangeSummary {
            previous_hash,
            current_hash,
            noop: false,
            partial: false,
            reordered: false,
            added,
            removed,
            changed,
            refreshed: Vec::new(),
            warnings: Vec::new(),
        };
        summary.noop = summary.nothing_changed();
        summary
    }

    pub fn with_refreshed(mut self, mut refreshed: Vec<RepoId>) -> Self {
        refreshed.sort();
        self.refreshed = refreshed;
        self.noop = self.nothing_changed();
        self
    }

    pub fn with_reordered(mut self, reordered: bool) -> Self {
        self.reordered = reordered;
        self.noop = self.nothing_changed();
        self
    }

    /// Attach the discovery warnings of the cycle; any warning marks it partial.
    pub fn with_warnings(mut self, warnings: Vec<PartialDiscovery>) -> Self {
        self.partial = !warnings.is_empty();
        self.warnings = warnings;
        self
    }

    fn nothing_changed(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.refreshed.is_empty()
            && !self.reordered
    }

    pub fn is_noop(&self) -> bool {
        self.noop
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn score_changes(&self) -> impl Iterator<Item = &EntryChange> {
        self.changed.iter().filter(|c| c.score_changed())
    }

    pub fn category_moves(&self) -> impl Iterator<Item = &EntryChange> {
        self.changed.iter().filter(|c| c.category_moved())
    }
}
