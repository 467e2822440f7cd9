//! Binary fetches - suite snapshots and library files over HTTP.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;

use crate::builder::archive::extract_tarball;
use crate::sources::fetcher::FetchRequest;
use crate::util::fs::{ensure_dir, remove_dir_all_if_exists};

/// Downloads `<url>/<name>-<version>.tar.gz` snapshots and plain files.
pub struct BinaryFetcher {
    timeout: Option<Duration>,
}

impl BinaryFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        BinaryFetcher { timeout }
    }

    /// URL of the snapshot for a request.
    pub fn snapshot_url(request: &FetchRequest) -> String {
        format!(
            "{}/{}-{}.tar.gz",
            request.url.trim_end_matches('/'),
            request.name,
            request.version
        )
    }

    fn client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().context("failed to create HTTP client")
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client()?
            .get(url)
            .send()
            .with_context(|| format!("failed to download {}", url))?;

        if !response.status().is_success() {
            bail!("failed to download {}: HTTP {}", url, response.status());
        }

        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read response body from {}", url))?;
        Ok(bytes.to_vec())
    }

    /// Download and unpack a suite snapshot into `dest`.
    ///
    /// The snapshot is unpacked next to `dest` and moved into place only
    /// once extraction succeeded.
    pub fn fetch(&self, request: &FetchRequest, dest: &Path) -> Result<()> {
        let url = Self::snapshot_url(request);
        tracing::info!("Downloading {}", url);

        let data = self.get(&url)?;
        let parent = staging_parent(dest)?;
        let staging = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(parent)
            .with_context(|| format!("failed to create staging directory in {}", parent.display()))?;

        let prefix = format!("{}-{}", request.name, request.version);
        extract_tarball(&data, staging.path(), Some(&prefix))
            .with_context(|| format!("failed to extract {}", url))?;

        remove_dir_all_if_exists(dest)?;
        std::fs::rename(staging.path(), dest)
            .with_context(|| format!("failed to move snapshot into {}", dest.display()))?;
        Ok(())
    }

    /// Download one file to `dest`. An interrupted download never leaves a
    /// partial file at `dest`.
    pub fn download_to(&self, url: &str, dest: &Path) -> Result<()> {
        tracing::info!("Downloading {}", url);

        let data = self.get(url)?;
        let parent = staging_parent(dest)?;
        let mut partial = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
        partial
            .write_all(&data)
            .with_context(|| format!("failed to write {}", partial.path().display()))?;
        partial
            .persist(dest)
            .with_context(|| format!("failed to move download into {}", dest.display()))?;
        Ok(())
    }
}

fn staging_parent(dest: &Path) -> Result<&Path> {
    let parent = dest
        .parent()
        .with_context(|| format!("`{}` has no parent directory", dest.display()))?;
    ensure_dir(parent)?;
    Ok(parent)
}
