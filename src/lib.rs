//! Deterministic curation engine for ranked lists of open-source repositories.
//!
//! `curation-core` discovers repositories through a rate-limited, cached
//! search API, scores them with a configurable weight set, assigns them to
//! categories, and merges the result into a persisted ranked list with a
//! structural change summary. Identical inputs always produce identical
//! documents, byte-for-byte.

pub mod categorize;
pub mod config;
pub mod discovery;
pub mod merge;
pub mod pipeline;
pub mod ratelimit;
pub mod scoring;
pub mod store;
pub mod types;
