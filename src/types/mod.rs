pub mod identifiers;
pub mod record;

pub use identifiers::{ContentHash, RepoId, RepoIdError};
pub use record::{CategorizedRecord, Metric, RepositoryRecord, ScoredRecord, NO_LICENSE};
