//! `suitebuild clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use suitebuild::ops::clean;
use suitebuild::util::GlobalContext;

pub fn execute(_args: CleanArgs, ctx: &GlobalContext) -> Result<()> {
    let result = clean(ctx)?;
    if result.removed {
        eprintln!("     Removed {}", result.output_root.display());
    }
    Ok(())
}
