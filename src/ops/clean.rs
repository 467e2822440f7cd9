//! Implementation of `suitebuild clean`.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::ops::workspace::{Overrides, Workspace};
use crate::util::fs::remove_dir_all_if_exists;
use crate::util::GlobalContext;

/// What `clean` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanResult {
    pub output_root: PathBuf,
    pub removed: bool,
}

/// Remove the output root: unit outputs, archives, staging and
/// fingerprints.
pub fn clean(gctx: &GlobalContext) -> Result<CleanResult> {
    let overrides = Overrides {
        offline: true,
        ..Overrides::default()
    };
    let ws = Workspace::load(gctx, &overrides)?;
    let output_root = ws.output_root().to_path_buf();

    if ws.root().starts_with(&output_root) {
        bail!(
            "refusing to clean `{}`: it contains the suite itself",
            output_root.display()
        );
    }

    let removed = output_root.exists();
    remove_dir_all_if_exists(&output_root)?;
    if removed {
        tracing::debug!("removed {}", output_root.display());
    }
    Ok(CleanResult { output_root, removed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::{descriptors, SuiteFixture};
    use tempfile::TempDir;

    fn gctx(tmp: &TempDir, config: Option<&str>) -> GlobalContext {
        let mut fixture = SuiteFixture::new("s").with_descriptor(descriptors::archive_project("s", "core"));
        if let Some(config) = config {
            fixture = fixture.with_file(".suitebuild/config.toml", config);
        }
        let root = fixture.write_to(&tmp.path().join("s")).unwrap();
        GlobalContext::with_cwd(root)
            .unwrap()
            .with_home(tmp.path().join("home"))
    }

    #[test]
    fn test_clean_removes_output_root() {
        let tmp = TempDir::new().unwrap();
        let gctx = gctx(&tmp, None);
        let fingerprint = tmp.path().join("s/build/.fingerprints/s/core.json");
        std::fs::create_dir_all(fingerprint.parent().unwrap()).unwrap();
        std::fs::write(&fingerprint, "{}").unwrap();

        let result = clean(&gctx).unwrap();
        assert!(result.removed);
        assert!(!tmp.path().join("s/build").exists());

        assert!(!clean(&gctx).unwrap().removed);
    }

    #[test]
    fn test_refuses_to_remove_suite_root() {
        let tmp = TempDir::new().unwrap();
        let gctx = gctx(&tmp, Some("[build]\noutput_dir = \".\"\n"));
        assert!(clean(&gctx).is_err());
        assert!(tmp.path().join("s/suite.toml").is_file());
    }
}
