use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Stable repository identity: `owner/name`.
///
/// Equality, hashing and ordering are case-insensitive; the original casing is
/// kept for display and links.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    owner: String,
    name: String,
    key: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoIdError {
    #[error("Repository id must have the form owner/name: {0:?}")]
    Malformed(String),
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoIdError> {
        let owner = owner.into().trim().to_string();
        let name = name.into().trim().to_string();

        if owner.is_empty() || name.is_empty() || owner.contains('/') || name.contains('/') {
            return Err(RepoIdError::Malformed(format!("{owner}/{name}")));
        }

        let key = format!("{}/{}", owner.to_lowercase(), name.to_lowercase());
        Ok(RepoId { owner, name, key })
    }

    /// Parse a `full_name` as returned by the search API.
    pub fn parse(full_name: &str) -> Result<Self, RepoIdError> {
        let (owner, name) = full_name
            .split_once('/')
            .ok_or_else(|| RepoIdError::Malformed(full_name.to_string()))?;
        Self::new(owner, name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased `owner/name`, the deduplication key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// File-system friendly `owner__name`.
    pub fn slug(&self) -> String {
        format!("{}__{}", self.owner, self.name)
    }
}

impl PartialEq for RepoId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RepoId {}

impl Hash for RepoId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for RepoId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RepoId {
    // (owner, name) lexicographic on the lowercased parts
    fn cmp(&self, other: &Self) -> Ordering {
        self.owner
            .to_lowercase()
            .cmp(&other.owner.to_lowercase())
            .then_with(|| self.name.to_lowercase().cmp(&other.name.to_lowercase()))
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl TryFrom<String> for RepoId {
    type Error = RepoIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RepoId::parse(&value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.to_string()
    }
}

/// `sha256:<hex>` digest of canonical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_bytes(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);

        let hash = hasher.finalize();
        let hex = hex::encode(hash);

        ContentHash(format!("sha256:{hex}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
