//! `suitebuild licenses` command

use anyhow::Result;

use crate::cli::{FormatArg, LicensesArgs};
use suitebuild::ops::licenses;
use suitebuild::util::diagnostic::emit;
use suitebuild::util::GlobalContext;

pub fn execute(args: LicensesArgs, ctx: &GlobalContext, color: bool) -> Result<()> {
    let reports = licenses(ctx, &args.target, args.offline)?;

    for report in &reports {
        match args.message_format {
            FormatArg::Json => println!("{}", serde_json::to_string(&report.summary())?),
            FormatArg::Human => {
                let ids: Vec<&str> = report.licenses.iter().map(String::as_str).collect();
                println!("{}: {}", report.distribution, ids.join(", "));
                for warning in &report.warnings {
                    emit(warning, color);
                }
            }
        }
    }
    Ok(())
}
