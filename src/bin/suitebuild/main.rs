//! suitebuild CLI

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::build::BuildFailed;
use suitebuild::resolver::ResolveError;
use suitebuild::util::context::DescriptorNotFound;
use suitebuild::util::diagnostic::{emit, suggestions, Diagnostic};
use suitebuild::util::GlobalContext;

/// Resolution failed before anything was built.
const EXIT_RESOLVE: i32 = 2;
const EXIT_FAILURE: i32 = 1;

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("suitebuild=debug")
    } else {
        EnvFilter::new("suitebuild=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let color = !cli.no_color && std::io::stderr().is_terminal();
    if let Err(err) = run(cli, color) {
        std::process::exit(report(&err, color));
    }
}

fn run(cli: Cli, color: bool) -> Result<()> {
    let mut ctx = GlobalContext::new()?;
    if let Some(home) = cli.home {
        ctx = ctx.with_home(home);
    }
    ctx.set_verbose(cli.verbose);

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &ctx),
        Commands::Order(args) => commands::order::execute(args, &ctx),
        Commands::Licenses(args) => commands::licenses::execute(args, &ctx, color),
        Commands::Clean(args) => commands::clean::execute(args, &ctx),
    }
}

/// Print `err` and pick the exit status.
fn report(err: &anyhow::Error, color: bool) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ResolveError>() {
            emit(&e.to_diagnostic(), color);
            return EXIT_RESOLVE;
        }
        if let Some(e) = cause.downcast_ref::<DescriptorNotFound>() {
            emit(
                &Diagnostic::error(e.to_string()).with_suggestion(suggestions::NO_DESCRIPTOR),
                color,
            );
            return EXIT_RESOLVE;
        }
        if let Some(e) = cause.downcast_ref::<BuildFailed>() {
            emit(
                &Diagnostic::error(e.to_string()).with_suggestion(suggestions::BUILD_FAILED),
                color,
            );
            return EXIT_FAILURE;
        }
    }

    emit(&Diagnostic::error(format!("{:#}", err)), color);
    EXIT_FAILURE
}
