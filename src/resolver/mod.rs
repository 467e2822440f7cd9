//! Dependency resolution.
//!
//! Turns a loaded [`Registry`](crate::core::Registry) into a deterministic
//! [`BuildOrder`], verifies the libraries that order references, and
//! aggregates license obligations. Nothing in here builds anything; every
//! error it returns is fatal before the first unit starts.

pub mod errors;
pub mod graph;
pub mod libraries;
pub mod licenses;

pub use errors::ResolveError;
pub use graph::{resolve, BuildOrder, BuildUnit, UnitKind};
pub use libraries::{resolve_libraries, ResolvedLibraries, ResolvedLibrary};
pub use licenses::{collect as collect_licenses, LicenseReport};
