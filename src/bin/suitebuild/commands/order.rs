//! `suitebuild order` command

use anyhow::Result;

use crate::cli::{FormatArg, OrderArgs};
use suitebuild::ops::order;
use suitebuild::util::GlobalContext;

pub fn execute(args: OrderArgs, ctx: &GlobalContext) -> Result<()> {
    let entries = order(ctx, &args.target, args.offline)?;

    for entry in &entries {
        match args.message_format {
            FormatArg::Json => println!("{}", serde_json::to_string(entry)?),
            FormatArg::Human => {
                let kind = entry.kind.as_str();
                if entry.dependencies.is_empty() {
                    println!("{} ({})", entry.unit, kind);
                } else {
                    let deps: Vec<String> = entry.dependencies.iter().map(|d| d.to_string()).collect();
                    println!("{} ({}) <- {}", entry.unit, kind, deps.join(", "));
                }
            }
        }
    }
    Ok(())
}
