//! Global context for suitebuild operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::core::descriptor::DESCRIPTOR_NAME;
use crate::util::config::{global_config_path, load_config, project_config_path, Config};

/// Project directories for suitebuild
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "suitebuild", "suitebuild"));

/// Error raised when no suite descriptor can be located.
#[derive(Debug, thiserror::Error)]
#[error("could not find `{name}` in `{dir}` or any parent directory")]
pub struct DescriptorNotFound {
    pub name: &'static str,
    pub dir: PathBuf,
}

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global suitebuild data (fetched suites, libraries)
    home: PathBuf,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let home = if let Some(dirs) = PROJECT_DIRS.as_ref() {
            dirs.cache_dir().to_path_buf()
        } else {
            directories::BaseDirs::new()
                .map(|b| b.home_dir().join(".suitebuild"))
                .unwrap_or_else(|| PathBuf::from(".suitebuild"))
        };

        Ok(GlobalContext {
            cwd,
            home,
            verbose: false,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Override the home directory (used by tests and `SUITEBUILD_HOME`).
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the suitebuild home directory.
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the cache directory for fetched suites and libraries.
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Find `suite.toml` starting from cwd and searching upward.
    pub fn find_descriptor(&self) -> Result<PathBuf, DescriptorNotFound> {
        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(DESCRIPTOR_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                return Err(DescriptorNotFound {
                    name: DESCRIPTOR_NAME,
                    dir: self.cwd.clone(),
                });
            }
        }
    }

    /// Load the merged configuration for the suite rooted at `suite_root`.
    pub fn load_config(&self, suite_root: &Path) -> Config {
        let global = global_config_path();
        load_config(global.as_deref(), &project_config_path(suite_root))
    }
}
