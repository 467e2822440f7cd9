//! Git fetches - imported suites checked out from git repositories.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks, Repository, ResetType};
use url::Url;

use crate::sources::fetcher::FetchRequest;

/// Clones a repository once and checks out the requested version.
pub struct GitFetcher {
    timeout: Option<Duration>,
}

impl GitFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        GitFetcher { timeout }
    }

    /// Clone or update `request.url` into `dest` and hard-reset it to
    /// `request.version` (a commit id, tag or branch).
    pub fn fetch(&self, request: &FetchRequest, dest: &Path) -> Result<()> {
        let url = Url::parse(&request.url)
            .or_else(|_| Url::from_file_path(&request.url).map_err(|_| ()))
            .map_err(|_| anyhow::anyhow!("invalid git url `{}`", request.url))?;

        let repo = if dest.join(".git").exists() {
            let repo = Repository::open(dest)
                .with_context(|| format!("failed to open git repository at {}", dest.display()))?;
            if find_commit(&repo, &request.version).is_none() {
                self.update(&repo, &url)?;
            }
            repo
        } else {
            self.clone(&url, dest)?
        };

        let commit = find_commit(&repo, &request.version).with_context(|| {
            format!("version `{}` not found in {}", request.version, url)
        })?;
        repo.reset(commit.as_object(), ResetType::Hard, None)
            .with_context(|| format!("failed to check out {} at {}", url, request.version))?;

        tracing::debug!("checked out {} at {}", request.name, commit.id());
        Ok(())
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(timeout) = self.timeout {
            let deadline = Instant::now() + timeout;
            callbacks.transfer_progress(move |_| Instant::now() < deadline);
        }
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options
    }

    fn clone(&self, url: &Url, dest: &Path) -> Result<Repository> {
        tracing::info!("Cloning {}", url);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        RepoBuilder::new()
            .fetch_options(self.fetch_options())
            .clone(url.as_str(), dest)
            .with_context(|| format!("failed to clone {}", url))
    }

    fn update(&self, repo: &Repository, url: &Url) -> Result<()> {
        tracing::info!("Updating {}", url);

        let mut remote = repo.find_remote("origin")?;
        remote
            .fetch(
                &["+refs/heads/*:refs/remotes/origin/*", "+refs/tags/*:refs/tags/*"],
                Some(&mut self.fetch_options()),
                None,
            )
            .with_context(|| format!("failed to fetch {}", url))?;
        Ok(())
    }
}

fn find_commit<'r>(repo: &'r Repository, version: &str) -> Option<git2::Commit<'r>> {
    let candidates = [
        version.to_string(),
        format!("refs/tags/{}", version),
        format!("refs/remotes/origin/{}", version),
    ];
    candidates
        .iter()
        .find_map(|spec| repo.revparse_single(spec).ok())
        .and_then(|object| object.peel_to_commit().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fetcher::FetchKind;
    use tempfile::TempDir;

    fn commit_file(repo: &Repository, name: &str, contents: &str) -> git2::Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        std::fs::write(workdir.join(name), contents).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let parents: Vec<_> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<_> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn test_checkout_pinned_commit() {
        let upstream_dir = TempDir::new().unwrap();
        let upstream = Repository::init(upstream_dir.path()).unwrap();
        let first = commit_file(&upstream, "suite.toml", "[suite]\nname = \"one\"\n");
        commit_file(&upstream, "suite.toml", "[suite]\nname = \"two\"\n");

        let cache = TempDir::new().unwrap();
        let dest = cache.path().join("checkout");
        let request = FetchRequest {
            name: "dep".to_string(),
            version: first.to_string(),
            url: Url::from_file_path(upstream_dir.path()).unwrap().to_string(),
            kind: FetchKind::Git,
        };

        GitFetcher::new(None).fetch(&request, &dest).unwrap();
        let contents = std::fs::read_to_string(dest.join("suite.toml")).unwrap();
        assert!(contents.contains("one"));

        // A second fetch reuses the checkout.
        GitFetcher::new(None).fetch(&request, &dest).unwrap();
    }

    #[test]
    fn test_unknown_version_fails() {
        let upstream_dir = TempDir::new().unwrap();
        let upstream = Repository::init(upstream_dir.path()).unwrap();
        commit_file(&upstream, "suite.toml", "[suite]\nname = \"one\"\n");

        let cache = TempDir::new().unwrap();
        let request = FetchRequest {
            name: "dep".to_string(),
            version: "no-such-tag".to_string(),
            url: Url::from_file_path(upstream_dir.path()).unwrap().to_string(),
            kind: FetchKind::Git,
        };
        let err = GitFetcher::new(None)
            .fetch(&request, &cache.path().join("checkout"))
            .unwrap_err();
        assert!(err.to_string().contains("no-such-tag"));
    }
}
