//! Test utilities and mocks for suitebuild unit tests.
//!
//! Network access and toolchain invocations are the two seams that are
//! hard to exercise for real, so both have recording mocks here.
//!
//! # Example
//!
//! ```rust,ignore
//! use suitebuild::test_support::{MockFetcher, MockToolchain};
//!
//! #[test]
//! fn test_example() {
//!     let fetcher = MockFetcher::new().with_checkout("https://example.com/sdk.git", sdk_dir);
//!     let toolchain = MockToolchain::new().failing_on("javac");
//!
//!     // Use mocks in tests...
//! }
//! ```

pub mod fixtures;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::builder::toolchain::{ToolOutput, Toolchain};
use crate::sources::{FetchRequest, Fetcher};

pub use fixtures::*;

/// Fetcher that serves local directories and files instead of the network.
///
/// Every request is recorded, including the ones that fail.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    checkouts: HashMap<String, PathBuf>,
    files: HashMap<String, PathBuf>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `dir` as the checkout for `url`.
    pub fn with_checkout(mut self, url: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.checkouts.insert(url.into(), dir.into());
        self
    }

    /// Serve `path` as the download for `url`.
    pub fn with_file(mut self, url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.insert(url.into(), path.into());
        self
    }

    /// All fetch requests seen so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<PathBuf> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.checkouts.get(&request.url) {
            Some(dir) => Ok(dir.clone()),
            None => bail!("no mock checkout for {}", request.url),
        }
    }

    fn download(&self, url: &str, _sha256: &str) -> Result<PathBuf> {
        match self.files.get(url) {
            Some(path) => Ok(path.clone()),
            None => bail!("no mock download for {}", url),
        }
    }
}

/// One recorded toolchain invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

type Effect = dyn Fn(&[String], &BTreeMap<String, String>, &Path) + Send + Sync;

/// Toolchain that records calls instead of running anything.
///
/// By default every command succeeds with empty output. Clones share the
/// same call log.
#[derive(Clone, Default)]
pub struct MockToolchain {
    calls: Arc<Mutex<Vec<ToolCall>>>,
    failing: Vec<String>,
    effect: Option<Arc<Effect>>,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with exit status 1 when the program name contains `pattern`.
    pub fn failing_on(mut self, pattern: impl Into<String>) -> Self {
        self.failing.push(pattern.into());
        self
    }

    /// Run `effect` for every successful call, e.g. to create the files a
    /// real command would produce.
    pub fn with_effect<F>(mut self, effect: F) -> Self
    where
        F: Fn(&[String], &BTreeMap<String, String>, &Path) + Send + Sync + 'static,
    {
        self.effect = Some(Arc::new(effect));
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for MockToolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockToolchain")
            .field("calls", &self.calls().len())
            .field("failing", &self.failing)
            .finish()
    }
}

impl Toolchain for MockToolchain {
    fn invoke(&self, command: &[String], env: &BTreeMap<String, String>, cwd: &Path) -> Result<ToolOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ToolCall {
                command: command.to_vec(),
                env: env.clone(),
                cwd: cwd.to_path_buf(),
            });
        }

        let program = command.first().map(String::as_str).unwrap_or_default();
        if self.failing.iter().any(|p| program.contains(p.as_str())) {
            return Ok(ToolOutput {
                status: Some(1),
                success: false,
                stdout: String::new(),
                stderr: format!("{} failed", command.join(" ")),
            });
        }

        if let Some(effect) = &self.effect {
            effect(command, env, cwd);
        }
        Ok(ToolOutput {
            status: Some(0),
            success: true,
            ..ToolOutput::default()
        })
    }
}
