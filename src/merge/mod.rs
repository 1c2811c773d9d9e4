pub mod document;
pub mod merger;
pub mod summary;

pub use document::{ArchivedEntry, Partition, RankedListDocument, DOCUMENT_SCHEMA_VERSION};
pub use merger::{
    merge, rank_order, relisted, MergeError, MergeOptions, MergeOutcome, RemovedPolicy,
};
pub use summary::{AddedEntry, ChangeSummary, EntryChange, RemovedEntry, SCORE_EPSILON};
