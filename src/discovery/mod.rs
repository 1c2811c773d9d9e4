pub mod coordinator;
pub mod fetcher;
pub mod github;
pub mod query;

pub use coordinator::{DiscoveryCoordinator, DiscoveryOptions, DiscoveryOutcome};
pub use fetcher::{
    Enrichment, FetchError, MetadataFetcher, Page, PageRequest, PageResponse, PartialDiscovery, CANCELLED,
};
pub use github::GitHubFetcher;
pub use query::QuerySpec;
