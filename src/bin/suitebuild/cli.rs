//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use suitebuild::builder::MessageFormat;

/// suitebuild - build projects and distributions declared in suite.toml
#[derive(Parser)]
#[command(name = "suitebuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Directory for cached imports and libraries
    #[arg(long, global = true, env = "SUITEBUILD_HOME", hide = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build projects and distributions
    Build(BuildArgs),

    /// Print the resolved build order
    Order(OrderArgs),

    /// Show the licenses each distribution carries
    Licenses(LicensesArgs),

    /// Remove build outputs
    Clean(CleanArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    #[default]
    Human,
    Json,
}

impl From<FormatArg> for MessageFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Human => MessageFormat::Human,
            FormatArg::Json => MessageFormat::Json,
        }
    }
}

#[derive(Args)]
pub struct BuildArgs {
    /// Unit to build along with its dependencies (repeatable)
    #[arg(long, value_name = "UNIT")]
    pub target: Vec<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Do not access the network
    #[arg(long)]
    pub offline: bool,

    /// Target platform as <os>-<arch> (repeatable)
    #[arg(long, value_name = "OS-ARCH")]
    pub platform: Vec<String>,

    /// Output format for build progress
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub message_format: FormatArg,
}

#[derive(Args)]
pub struct OrderArgs {
    /// Restrict the order to these units and their dependencies
    #[arg(long, value_name = "UNIT")]
    pub target: Vec<String>,

    /// Do not access the network
    #[arg(long)]
    pub offline: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub message_format: FormatArg,
}

#[derive(Args)]
pub struct LicensesArgs {
    /// Distributions to report on (defaults to all in the root suite)
    #[arg(long, value_name = "DIST")]
    pub target: Vec<String>,

    /// Do not access the network
    #[arg(long)]
    pub offline: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub message_format: FormatArg,
}

#[derive(Args)]
pub struct CleanArgs {}
