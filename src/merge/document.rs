use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CategorizedRecord, ContentHash, RepoId};

pub const DOCUMENT_SCHEMA_VERSION: u32 = 1;

/// Ranked entries of one category, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub category: String,
    pub entries: Vec<CategorizedRecord>,
}

/// A previously listed repository kept after it stopped being discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEntry {
    pub entry: CategorizedRecord,
    pub archived_at: DateTime<Utc>,
}

/// The persisted ranked list. Each cycle builds a new one; the previous
/// version is referenced by hash, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedListDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub weights_version: Option<ContentHash>,
    #[serde(default)]
    pub previous_hash: Option<ContentHash>,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    #[serde(default)]
    pub archived: Vec<ArchivedEntry>,
}

impl Default for RankedListDocument {
    fn default() -> Self {
        Self::empty()
    }
}

/// The part of a document its hash covers: what a reader of the list sees.
#[derive(Serialize)]
struct HashedContent<'a> {
    partitions: Vec<HashedPartition<'a>>,
    archived: Vec<HashedEntry<'a>>,
}

#[derive(Serialize)]
struct HashedPartition<'a> {
    category: &'a str,
    entries: Vec<HashedEntry<'a>>,
}

/// An entry without its snapshot time or weight set version.
#[derive(Serialize)]
struct HashedEntry<'a> {
    id: &'a RepoId,
    url: &'a str,
    description: &'a str,
    license: Option<&'a str>,
    stars: u64,
    forks: u64,
    open_issues: u64,
    open_prs: Option<u64>,
    discussions: Option<u64>,
    contributors: Option<u64>,
    last_commit: Option<DateTime<Utc>>,
    topics: &'a BTreeSet<String>,
    score: f64,
    categories: &'a [String],
}

impl<'a> From<&'a CategorizedRecord> for HashedEntry<'a> {
    fn from(entry: &'a CategorizedRecord) -> Self {
        let record = entry.record();
        HashedEntry {
            id: &record.id,
            url: &record.url,
            description: &record.description,
            license: record.license.as_deref(),
            stars: record.stars,
            forks: record.forks,
            open_issues: record.open_issues,
            open_prs: record.open_prs,
            discussions: record.discussions,
            contributors: record.contributors,
            last_commit: record.last_commit,
            topics: &record.topics,
            score: entry.score(),
            categories: &entry.categories,
        }
    }
}

impl RankedListDocument {
    pub fn empty() -> Self {
        RankedListDocument {
            schema_version: DOCUMENT_SCHEMA_VERSION,
            generated_at: None,
            weights_version: None,
            previous_hash: None,
            partitions: Vec::new(),
            archived: Vec::new(),
        }
    }

    /// No listed and no archived entries.
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|p| p.entries.is_empty()) && self.archived.is_empty()
    }

    /// Hash of listed and archived content. Snapshot and generation
    /// timestamps, weight set versions and lineage are not part of it.
    pub fn content_hash(&self) -> Result<ContentHash, serde_json::Error> {
        let content = HashedContent {
            partitions: self
                .partitions
                .iter()
                .map(|p| HashedPartition {
                    category: &p.category,
                    entries: p.entries.iter().map(HashedEntry::from).collect(),
                })
                .collect(),
            archived: self.archived.iter().map(|a| HashedEntry::from(&a.entry)).collect(),
        };
        let bytes = serde_json::to_vec(&content)?;
        Ok(ContentHash::from_bytes(&bytes))
    }

    /// Category and entry order as listed.
    pub fn layout(&self) -> Vec<(&str, Vec<&RepoId>)> {
        self.partitions
            .iter()
            .map(|p| (p.category.as_str(), p.entries.iter().map(|e| e.id()).collect()))
            .collect()
    }

    pub fn partition(&self, category: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.category == category)
    }

    /// Each listed repository once, in document order.
    pub fn entries(&self) -> impl Iterator<Item = &CategorizedRecord> {
        let mut seen = HashSet::new();
        self.partitions
            .iter()
            .flat_map(|p| p.entries.iter())
            .filter(move |e| seen.insert(e.id().clone()))
    }

    pub fn find(&self, id: &RepoId) -> Option<&CategorizedRecord> {
        self.partitions
            .iter()
            .flat_map(|p| p.entries.iter())
            .find(|e| e.id() == id)
    }

    /// Partitions that list `id`.
    pub fn categories_listing(&self, id: &RepoId) -> Vec<&str> {
        self.partitions
            .iter()
            .filter(|p| p.entries.iter().any(|e| e.id() == id))
            .map(|p| p.category.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_archived(&self, id: &RepoId) -> bool {
        self.archived.iter().any(|a| a.entry.id() == id)
    }
}
