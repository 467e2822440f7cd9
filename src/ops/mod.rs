//! High-level operations.
//!
//! This module contains the implementation of suitebuild commands.

pub mod build;
pub mod clean;
pub mod licenses;
pub mod order;
pub mod workspace;

pub use build::{build, build_with, BuildOptions};
pub use clean::{clean, CleanResult};
pub use licenses::licenses;
pub use order::{order, OrderEntry};
pub use workspace::{Overrides, Workspace};
