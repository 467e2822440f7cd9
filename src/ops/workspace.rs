//! Workspace: the loaded suite graph plus the settings every command needs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::{Platform, Registry, UnitId};
use crate::sources::DefaultFetcher;
use crate::util::config::{Config, DEFAULT_OUTPUT_DIR};
use crate::util::GlobalContext;

/// Settings given on the command line. They take precedence over config
/// files.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub offline: bool,
    pub jobs: Option<usize>,
    pub platforms: Vec<String>,
}

/// A loaded root suite with all of its imports.
pub struct Workspace {
    descriptor: PathBuf,
    root: PathBuf,
    config: Config,
    output_root: PathBuf,
    fetcher: DefaultFetcher,
    registry: Registry,
}

impl Workspace {
    /// Locate the descriptor from the current directory and load the suite
    /// graph.
    pub fn load(gctx: &GlobalContext, overrides: &Overrides) -> Result<Self> {
        let descriptor = gctx.find_descriptor()?;
        let root = descriptor
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let mut config = gctx.load_config(&root);
        if overrides.offline {
            config.net.offline = true;
        }
        if overrides.jobs.is_some() {
            config.build.jobs = overrides.jobs;
        }
        if !overrides.platforms.is_empty() {
            config.build.platforms = overrides.platforms.clone();
        }

        let output_root = root.join(
            config
                .build
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        );

        let fetcher = DefaultFetcher::new(
            gctx.cache_dir(),
            config.net.offline,
            config.net.git_timeout.map(Duration::from_secs),
        );

        tracing::debug!("loading suite graph from {}", descriptor.display());
        let registry = Registry::load(&descriptor, &fetcher)?;

        Ok(Workspace {
            descriptor,
            root,
            config,
            output_root,
            fetcher,
            registry,
        })
    }

    pub fn descriptor(&self) -> &Path {
        &self.descriptor
    }

    /// Directory containing the root descriptor.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Where unit outputs, staging and fingerprints live.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn fetcher(&self) -> &DefaultFetcher {
        &self.fetcher
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse command-line unit references. Bare names refer to the root
    /// suite.
    pub fn parse_targets(&self, targets: &[String]) -> Vec<UnitId> {
        let root = &self.registry.root_suite().name;
        targets.iter().map(|t| UnitId::parse_ref(t, root)).collect()
    }

    /// Number of worker threads to use.
    pub fn jobs(&self) -> usize {
        match self.config.build.jobs {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Parse a list of `<os>-<arch>` strings.
pub fn parse_platforms(raw: &[String]) -> Result<Vec<Platform>> {
    raw.iter()
        .map(|p| {
            p.parse::<Platform>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid platform in build settings: `{}`", p))
        })
        .collect()
}
