//! Configuration file support for suitebuild.
//!
//! Two configuration file locations are read:
//! - Global: `~/.suitebuild/config.toml` - User-wide defaults
//! - Project: `<suite root>/.suitebuild/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Default output directory, relative to the root suite directory.
pub const DEFAULT_OUTPUT_DIR: &str = "build";

/// suitebuild configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Toolchain settings
    pub toolchain: ToolchainSettings,

    /// Network settings
    pub net: NetConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default number of parallel jobs (None = number of CPUs)
    pub jobs: Option<usize>,

    /// Output root (relative paths resolve against the root suite directory)
    pub output_dir: Option<PathBuf>,

    /// Target platforms for platform-dependent distributions (`<os>-<arch>`)
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Toolchain settings for source-compiled projects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Default compiler command template, used when a project declares none.
    ///
    /// Placeholders: `{out}`, `{sources}`, `{classpath}`.
    #[serde(default)]
    pub compiler: Vec<String>,

    /// Version of the installed toolchain, checked against project compliance.
    pub version: Option<String>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Git fetch timeout in seconds
    pub git_timeout: Option<u64>,

    /// Offline mode (don't fetch from network)
    #[serde(default)]
    pub offline: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.output_dir.is_some() {
            self.build.output_dir = other.build.output_dir;
        }
        if !other.build.platforms.is_empty() {
            self.build.platforms = other.build.platforms;
        }

        if !other.toolchain.compiler.is_empty() {
            self.toolchain.compiler = other.toolchain.compiler;
        }
        if other.toolchain.version.is_some() {
            self.toolchain.version = other.toolchain.version;
        }

        if other.net.git_timeout.is_some() {
            self.net.git_timeout = other.net.git_timeout;
        }
        if other.net.offline {
            self.net.offline = true;
        }
    }

    /// Parse the configured toolchain version.
    ///
    /// Two-component versions such as `1.8` are accepted as `1.8.0`.
    pub fn toolchain_version(&self) -> Result<Option<Version>> {
        let Some(raw) = self.toolchain.version.as_deref() else {
            return Ok(None);
        };
        let padded = match raw.matches('.').count() {
            0 => format!("{}.0.0", raw),
            1 => format!("{}.0", raw),
            _ => raw.to_string(),
        };
        let version = Version::parse(&padded)
            .with_context(|| format!("invalid toolchain version `{}`", raw))?;
        Ok(Some(version))
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.suitebuild/config.toml)
/// 2. Global config (~/.suitebuild/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global suitebuild config directory (~/.suitebuild).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".suitebuild"))
}

/// Get the global config path (~/.suitebuild/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (<root>/.suitebuild/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".suitebuild").join("config.toml")
}
