//! Remote content.
//!
//! Imported suites and binary libraries are obtained through the
//! [`Fetcher`] trait. The default implementation clones git repositories,
//! downloads snapshots over HTTP, and keeps both in the user cache.

pub mod binary;
pub mod cache;
pub mod fetcher;
pub mod git;

pub use binary::BinaryFetcher;
pub use cache::SuiteCache;
pub use fetcher::{DefaultFetcher, FetchKind, FetchRequest, Fetcher};
pub use git::GitFetcher;
