use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{ContentHash, RepoId};

/// License key used when a repository reports no license or one the weight
/// table does not know.
pub const NO_LICENSE: &str = "none";

/// Numeric repository metrics that can carry a weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Stars,
    Forks,
    OpenIssues,
    Prs,
    Discussions,
    Contributors,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Stars,
        Metric::Forks,
        Metric::OpenIssues,
        Metric::Prs,
        Metric::Discussions,
        Metric::Contributors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Stars => "stars",
            Metric::Forks => "forks",
            Metric::OpenIssues => "open_issues",
            Metric::Prs => "prs",
            Metric::Discussions => "discussions",
            Metric::Contributors => "contributors",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown metric {s:?}"))
    }
}

/// One metadata snapshot of a repository, taken during a discovery cycle.
///
/// Records are never edited in place; enrichment and re-stamping build a new
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: RepoId,
    pub url: String,
    #[serde(default)]
    pub description: String,
    /// SPDX identifier as reported by the host.
    #[serde(default)]
    pub license: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    #[serde(default)]
    pub open_prs: Option<u64>,
    #[serde(default)]
    pub discussions: Option<u64>,
    #[serde(default)]
    pub contributors: Option<u64>,
    #[serde(default)]
    pub last_commit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topics: BTreeSet<String>,
    /// When this snapshot was observed. Recency is measured against it.
    pub fetched_at: DateTime<Utc>,
}

impl RepositoryRecord {
    /// Minimal snapshot; optional metrics start absent.
    pub fn new(id: RepoId, fetched_at: DateTime<Utc>) -> Self {
        let url = format!("https://github.com/{id}");
        RepositoryRecord {
            id,
            url,
            description: String::new(),
            license: None,
            stars: 0,
            forks: 0,
            open_issues: 0,
            open_prs: None,
            discussions: None,
            contributors: None,
            last_commit: None,
            topics: BTreeSet::new(),
            fetched_at,
        }
    }

    /// Value of a metric, `None` when the host did not report it.
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Stars => Some(self.stars as f64),
            Metric::Forks => Some(self.forks as f64),
            Metric::OpenIssues => Some(self.open_issues as f64),
            Metric::Prs => self.open_prs.map(|v| v as f64),
            Metric::Discussions => self.discussions.map(|v| v as f64),
            Metric::Contributors => self.contributors.map(|v| v as f64),
        }
    }

    /// License key for weight lookup; blank or missing maps to [`NO_LICENSE`].
    pub fn license_id(&self) -> &str {
        match self.license.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => NO_LICENSE,
        }
    }

    /// Whole days between the last commit and the snapshot time.
    pub fn days_since_commit(&self) -> Option<i64> {
        self.last_commit
            .map(|at| (self.fetched_at - at).num_days().max(0))
    }

    /// Same metadata observed again at `at` (e.g. a conditional request
    /// confirmed the cached page is unchanged).
    pub fn restamped(&self, at: DateTime<Utc>) -> Self {
        RepositoryRecord {
            fetched_at: at,
            ..self.clone()
        }
    }

    /// Same metadata as `other`, whenever each snapshot was taken.
    pub fn same_metadata(&self, other: &RepositoryRecord) -> bool {
        self.restamped(other.fetched_at) == *other
    }
}

/// A record plus its score under one weight configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: RepositoryRecord,
    pub score: f64,
    pub weights_version: ContentHash,
}

/// A scored record plus its categories, in category declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedRecord {
    pub scored: ScoredRecord,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl CategorizedRecord {
    pub fn id(&self) -> &RepoId {
        &self.scored.record.id
    }

    pub fn record(&self) -> &RepositoryRecord {
        &self.scored.record
    }

    pub fn score(&self) -> f64 {
        self.scored.score
    }
}
