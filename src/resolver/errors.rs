//! Resolution error types and diagnostics.
//!
//! Everything in here is fatal before the first unit starts building.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::UnitId;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error while loading suites or resolving the build graph.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ResolveError {
    #[error("could not fetch suite `{suite}` at version `{version}`")]
    #[diagnostic(code(suitebuild::resolve::unresolved_import))]
    UnresolvedImport {
        suite: String,
        version: String,
        importer: String,
        /// One line per location tried.
        attempts: Vec<String>,
    },

    #[error("suite `{suite}` is imported at conflicting versions")]
    #[diagnostic(code(suitebuild::resolve::duplicate_suite))]
    DuplicateSuite {
        suite: String,
        /// (importer, version) for each conflicting declaration.
        versions: Vec<(String, String)>,
    },

    #[error("dependency cycle: {}", join_path(.cycle))]
    #[diagnostic(code(suitebuild::resolve::cycle))]
    CyclicDependency { cycle: Vec<UnitId> },

    #[error("`{referrer}` depends on `{id}`, which is not declared by any loaded suite")]
    #[diagnostic(code(suitebuild::resolve::missing_dependency))]
    MissingDependency { id: UnitId, referrer: UnitId },

    #[error("content hash mismatch for library `{library}`")]
    #[diagnostic(code(suitebuild::resolve::integrity))]
    IntegrityMismatch {
        library: UnitId,
        expected: String,
        actual: String,
    },

    #[error("library `{library}` could not be obtained: {message}")]
    #[diagnostic(code(suitebuild::resolve::unresolved_library))]
    UnresolvedLibrary { library: UnitId, message: String },

    #[error("invalid suite descriptor {}: {message}", .path.display())]
    #[diagnostic(code(suitebuild::resolve::invalid_descriptor))]
    InvalidDescriptor { path: PathBuf, message: String },

    #[error("no project or distribution named `{target}`")]
    #[diagnostic(code(suitebuild::resolve::unknown_target))]
    UnknownTarget { target: String },
}

fn join_path(ids: &[UnitId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ResolveError {
    /// Shorthand for descriptor validation failures.
    pub fn invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ResolveError::InvalidDescriptor {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::UnresolvedImport {
                suite,
                version,
                importer,
                attempts,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "could not fetch suite `{}` at version `{}`",
                    suite, version
                ))
                .with_context(format!("imported by `{}`", importer));

                for attempt in attempts {
                    diag = diag.with_context(attempt.clone());
                }

                diag.with_suggestion(suggestions::FETCH_FAILED)
            }

            ResolveError::DuplicateSuite { suite, versions } => {
                let mut diag = Diagnostic::error(format!(
                    "suite `{}` is imported at conflicting versions",
                    suite
                ));

                for (importer, version) in versions {
                    diag = diag.with_context(format!("`{}` imports {} at {}", importer, suite, version));
                }

                diag.with_suggestion(format!("Pin every import of `{}` to the same version", suite))
            }

            ResolveError::CyclicDependency { cycle } => {
                Diagnostic::error("cycle detected in dependency graph")
                    .with_context(format!("cycle: {}", join_path(cycle)))
                    .with_suggestion("Break the cycle by removing one of the dependencies")
            }

            ResolveError::MissingDependency { id, referrer } => Diagnostic::error(format!(
                "unresolved dependency `{}`",
                id
            ))
            .with_context(format!("required by `{}`", referrer))
            .with_suggestion(format!(
                "Declare `{}` in suite `{}` or import the suite that declares it",
                id.name(),
                id.suite()
            )),

            ResolveError::IntegrityMismatch {
                library,
                expected,
                actual,
            } => Diagnostic::error(format!("content hash mismatch for library `{}`", library))
                .with_context(format!("expected sha256 {}", expected))
                .with_context(format!("actual sha256   {}", actual))
                .with_suggestion("Update the library's `sha256` if the new content is trusted"),

            ResolveError::UnresolvedLibrary { library, message } => {
                Diagnostic::error(format!("library `{}` could not be obtained", library))
                    .with_context(message.clone())
                    .with_suggestion("Give the library a `url` or a local `path`")
            }

            ResolveError::InvalidDescriptor { path, message } => {
                Diagnostic::error(message.clone()).with_location(path.clone())
            }

            ResolveError::UnknownTarget { target } => {
                Diagnostic::error(format!("no project or distribution named `{}`", target))
                    .with_suggestion(suggestions::UNIT_NOT_FOUND)
            }
        }
    }
}
