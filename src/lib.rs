//! suitebuild - a build orchestrator for multi-suite projects
//!
//! A suite is described by a `suite.toml` descriptor declaring imported
//! suites, licenses, libraries, projects and distributions. This crate
//! loads the suite graph, resolves a deterministic build order, builds
//! projects in parallel and assembles distributions into archives.

pub mod builder;
pub mod core;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Mocks and fixtures for unit tests.
#[cfg(test)]
pub mod test_support;

pub use core::{Registry, Suite, UnitId};
pub use resolver::{BuildOrder, ResolveError};
pub use util::context::GlobalContext;
