//! Core data structures for suitebuild.
//!
//! This module contains the foundational types used throughout suitebuild:
//! - Qualified identifiers ([`UnitId`]) and target platforms
//! - The raw `suite.toml` schema and the validated suite model
//! - Distribution layouts
//! - The registry of loaded suites

pub mod descriptor;
pub mod layout;
pub mod platform;
pub mod registry;
pub mod suite;
pub mod unit_id;

pub use descriptor::DESCRIPTOR_NAME;
pub use layout::{Layout, LayoutEntry, LayoutPhase, LayoutSource};
pub use platform::Platform;
pub use registry::Registry;
pub use suite::{Distribution, Library, License, Project, ProjectKind, Suite, SuiteRef};
pub use unit_id::UnitId;
