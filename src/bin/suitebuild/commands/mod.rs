//! Command implementations

pub mod build;
pub mod clean;
pub mod licenses;
pub mod order;
