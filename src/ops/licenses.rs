//! Implementation of `suitebuild licenses`.

use anyhow::{bail, Result};

use crate::ops::workspace::{Overrides, Workspace};
use crate::resolver::{collect_licenses, LicenseReport, ResolveError};
use crate::util::GlobalContext;

/// License reports for the requested distributions, or for every
/// distribution of the root suite when `targets` is empty.
pub fn licenses(gctx: &GlobalContext, targets: &[String], offline: bool) -> Result<Vec<LicenseReport>> {
    let overrides = Overrides {
        offline,
        ..Overrides::default()
    };
    let ws = Workspace::load(gctx, &overrides)?;
    let registry = ws.registry();

    let ids = if targets.is_empty() {
        registry.root_suite().distributions.keys().cloned().collect()
    } else {
        ws.parse_targets(targets)
    };

    let mut reports = Vec::with_capacity(ids.len());
    for id in &ids {
        match registry.distribution(id) {
            Some(dist) => reports.push(collect_licenses(registry, dist)),
            None if registry.is_unit(id) => bail!("`{}` is a project, not a distribution", id),
            None => {
                return Err(ResolveError::UnknownTarget {
                    target: id.to_string(),
                }
                .into())
            }
        }
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::SuiteFixture;
    use tempfile::TempDir;

    const DOC: &str = r#"
[suite]
name = "s"

[licenses.MIT]
name = "MIT License"

[libraries.JONI]
path = "joni.jar"
sha256 = "0000000000000000000000000000000000000000000000000000000000000000"
license = ["MIT"]

[projects.core]
dependencies = ["JONI"]
license = ["GPLv2"]

[distributions.RUBY]
dependencies = ["core"]
license = ["MIT"]
"#;

    fn gctx(tmp: &TempDir) -> GlobalContext {
        let root = SuiteFixture::new("s")
            .with_descriptor(DOC)
            .write_to(&tmp.path().join("s"))
            .unwrap();
        GlobalContext::with_cwd(root)
            .unwrap()
            .with_home(tmp.path().join("home"))
    }

    #[test]
    fn test_reports_every_distribution() {
        let tmp = TempDir::new().unwrap();
        let reports = licenses(&gctx(&tmp), &[], false).unwrap();
        assert_eq!(reports.len(), 1);
        let licenses: Vec<_> = reports[0].licenses.iter().map(String::as_str).collect();
        assert_eq!(licenses, vec!["GPLv2", "MIT"]);
        assert!(!reports[0].warnings.is_empty());
    }

    #[test]
    fn test_project_target_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = licenses(&gctx(&tmp), &["core".into()], false).unwrap_err();
        assert!(err.to_string().contains("not a distribution"));

        let err = licenses(&gctx(&tmp), &["nope".into()], false).unwrap_err();
        assert!(err.downcast_ref::<ResolveError>().is_some());
    }
}
