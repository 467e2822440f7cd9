//! The fetch interface.
//!
//! All network I/O goes through a [`Fetcher`], so loading and library
//! verification can run against a mock in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::sources::binary::BinaryFetcher;
use crate::sources::git::GitFetcher;
use crate::util::fs::ensure_dir;

/// How an import URL is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    /// A git repository checked out at the import's version.
    Git,
    /// A directory of `<name>-<version>.tar.gz` snapshots.
    Binary,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchKind::Git => write!(f, "git"),
            FetchKind::Binary => write!(f, "binary"),
        }
    }
}

/// A request for one imported suite's content at one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub name: String,
    pub version: String,
    pub url: String,
    pub kind: FetchKind,
}

/// Obtains remote content.
pub trait Fetcher: Send + Sync {
    /// Make the requested suite checkout available locally and return its
    /// directory.
    fn fetch(&self, request: &FetchRequest) -> Result<PathBuf>;

    /// Download a single file and return its local path.
    ///
    /// `sha256` keys the cache; callers verify the content themselves.
    fn download(&self, url: &str, sha256: &str) -> Result<PathBuf>;
}

/// The production fetcher: dispatches on [`FetchKind`] and keeps everything
/// under one cache directory.
pub struct DefaultFetcher {
    cache_dir: PathBuf,
    offline: bool,
    git: GitFetcher,
    binary: BinaryFetcher,
}

impl DefaultFetcher {
    pub fn new(cache_dir: PathBuf, offline: bool, timeout: Option<Duration>) -> Self {
        DefaultFetcher {
            git: GitFetcher::new(timeout),
            binary: BinaryFetcher::new(timeout),
            cache_dir,
            offline,
        }
    }

    /// Checkout directory for a suite at a version.
    pub fn suite_dir(&self, request: &FetchRequest) -> PathBuf {
        self.cache_dir
            .join("suites")
            .join(&request.name)
            .join(&request.version)
    }

    /// Cache location of a downloaded file.
    pub fn library_path(&self, url: &str, sha256: &str) -> PathBuf {
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("download");
        self.cache_dir.join("libraries").join(sha256).join(file_name)
    }
}

fn is_populated(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<PathBuf> {
        let dest = self.suite_dir(request);

        if self.offline {
            if is_populated(&dest) {
                return Ok(dest);
            }
            bail!(
                "suite `{}` at {} is not cached and network access is disabled",
                request.name,
                request.version
            );
        }

        match request.kind {
            FetchKind::Git => self.git.fetch(request, &dest)?,
            FetchKind::Binary => {
                if !is_populated(&dest) {
                    self.binary.fetch(request, &dest)?;
                }
            }
        }
        Ok(dest)
    }

    fn download(&self, url: &str, sha256: &str) -> Result<PathBuf> {
        let dest = self.library_path(url, sha256);
        if dest.is_file() {
            tracing::debug!("using cached download {}", dest.display());
            return Ok(dest);
        }
        if self.offline {
            bail!("{} is not cached and network access is disabled", url);
        }
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }
        self.binary.download_to(url, &dest)?;
        Ok(dest)
    }
}
