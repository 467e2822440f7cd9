//! Build error types.
//!
//! A build error belongs to one unit: it fails that unit and cancels its
//! dependents, while independent branches keep going.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::UnitId;
use crate::util::diagnostic::{suggestions, Diagnostic};

#[derive(Debug, Error, MietteDiagnostic)]
pub enum BuildError {
    #[error("`{unit}`: `{command}` failed with {}", describe_status(*.status))]
    #[diagnostic(code(suitebuild::build::toolchain))]
    ToolchainFailure {
        unit: UnitId,
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("`{distribution}`: `{destination}` is written by both `{first}` and `{second}`")]
    #[diagnostic(code(suitebuild::build::layout_conflict))]
    LayoutConflict {
        distribution: UnitId,
        destination: String,
        first: String,
        second: String,
    },

    #[error("`{unit}` requires toolchain {required}, found {found}")]
    #[diagnostic(code(suitebuild::build::compliance))]
    ComplianceMismatch {
        unit: UnitId,
        required: String,
        found: String,
    },

    #[error("`{unit}`: expected {} to exist", .path.display())]
    #[diagnostic(code(suitebuild::build::missing_result))]
    MissingResult { unit: UnitId, path: PathBuf },

    #[error(transparent)]
    #[diagnostic(code(suitebuild::build::other))]
    Other(#[from] anyhow::Error),
}

fn describe_status(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

impl BuildError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::ToolchainFailure {
                unit,
                command,
                status,
                stderr,
            } => {
                let mut diag = Diagnostic::error(format!("failed to build `{}`", unit))
                    .with_context(format!("command: {}", command))
                    .with_context(describe_status(*status));
                for line in stderr.lines().filter(|l| !l.trim().is_empty()).take(20) {
                    diag = diag.with_context(line.to_string());
                }
                diag.with_suggestion(suggestions::BUILD_FAILED)
            }

            BuildError::LayoutConflict {
                distribution,
                destination,
                first,
                second,
            } => Diagnostic::error(format!(
                "layout conflict in `{}` at `{}`",
                distribution, destination
            ))
            .with_context(format!("first written by `{}`", first))
            .with_context(format!("then by `{}`", second))
            .with_suggestion("Mark the later entry with `overwrite = true` if replacing is intended"),

            BuildError::ComplianceMismatch {
                unit,
                required,
                found,
            } => Diagnostic::error(format!("`{}` cannot be built with this toolchain", unit))
                .with_context(format!("requires {}", required))
                .with_context(format!("configured toolchain version is {}", found))
                .with_suggestion("Set `toolchain.version` in .suitebuild/config.toml"),

            BuildError::MissingResult { unit, path } => {
                Diagnostic::error(format!("`{}` did not produce {}", unit, path.display()))
                    .with_suggestion("Check the unit's `results` or layout sources")
            }

            BuildError::Other(err) => Diagnostic::error(format!("{:#}", err)),
        }
    }
}
