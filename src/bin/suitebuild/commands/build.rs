//! `suitebuild build` command

use anyhow::Result;

use crate::cli::BuildArgs;
use suitebuild::builder::UnitState;
use suitebuild::ops::{build, BuildOptions};
use suitebuild::util::GlobalContext;

/// Raised when at least one unit failed. Maps to exit status 1.
#[derive(Debug, thiserror::Error)]
#[error("build failed: {failed} unit(s) failed, {cancelled} cancelled")]
pub struct BuildFailed {
    pub failed: usize,
    pub cancelled: usize,
}

pub fn execute(args: BuildArgs, ctx: &GlobalContext) -> Result<()> {
    let opts = BuildOptions {
        targets: args.target,
        jobs: args.jobs,
        offline: args.offline,
        platforms: args.platform,
        message_format: args.message_format.into(),
        verbose: ctx.is_verbose(),
    };

    let report = build(ctx, &opts)?;
    if !report.success() {
        return Err(BuildFailed {
            failed: report.count(UnitState::Failed),
            cancelled: report.count(UnitState::Cancelled),
        }
        .into());
    }
    Ok(())
}
