//! Building units.
//!
//! Projects are compiled, run through a native command, or packaged as a
//! tree. Distributions are assembled from a layout into an archive. The
//! [`Scheduler`] runs units in parallel in dependency order and skips any
//! whose fingerprint is unchanged.

pub mod archive;
pub mod assembler;
pub mod context;
pub mod errors;
pub mod events;
pub mod fingerprint;
pub mod project;
pub mod scheduler;
pub mod toolchain;
pub mod unit;

pub use assembler::{Assembler, AssemblyPlan};
pub use context::BuildContext;
pub use errors::BuildError;
pub use events::{BuildEvent, EventSink, MessageFormat};
pub use fingerprint::UnitFingerprint;
pub use project::{BuildResult, ProjectBuilder};
pub use scheduler::{BuildReport, LedgerEntry, Scheduler, UnitEvent, UnitState};
pub use toolchain::{ProcessToolchain, ToolOutput, Toolchain};
pub use unit::{UnitBuilder, UnitOutcome, UnitRunner};
