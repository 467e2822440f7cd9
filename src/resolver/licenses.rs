//! License obligations of a distribution.
//!
//! Pure: reads the registry only. The walk covers the distribution's own
//! licenses, its constituent projects, their libraries and the transitive
//! `dist_dependencies`, skipping anything listed in `exclude`.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::{Distribution, Registry, UnitId};
use crate::util::diagnostic::Diagnostic;

/// Aggregated licenses and the problems found while collecting them.
#[derive(Debug, Clone)]
pub struct LicenseReport {
    pub distribution: UnitId,
    pub licenses: BTreeSet<String>,
    pub warnings: Vec<Diagnostic>,
}

/// Serializable view used by `licenses --message-format json`.
#[derive(Debug, Serialize)]
pub struct LicenseSummary<'a> {
    pub distribution: &'a UnitId,
    pub licenses: &'a BTreeSet<String>,
    pub warnings: Vec<String>,
}

impl LicenseReport {
    pub fn summary(&self) -> LicenseSummary<'_> {
        LicenseSummary {
            distribution: &self.distribution,
            licenses: &self.licenses,
            warnings: self.warnings.iter().map(|w| w.message.clone()).collect(),
        }
    }
}

/// Collect the license set of `dist`.
pub fn collect(registry: &Registry, dist: &Distribution) -> LicenseReport {
    let excluded: BTreeSet<&UnitId> = dist.exclude.iter().collect();
    let declared: BTreeSet<&str> = dist.licenses.iter().map(String::as_str).collect();

    let mut licenses: BTreeSet<String> = dist.licenses.iter().cloned().collect();
    let mut warnings = Vec::new();
    let mut visited: BTreeSet<UnitId> = BTreeSet::new();
    let mut stack: Vec<UnitId> = dist.all_dependencies().into_iter().cloned().collect();
    stack.reverse();

    while let Some(id) = stack.pop() {
        if excluded.contains(&id) || !visited.insert(id.clone()) {
            continue;
        }

        let (own, next): (&[String], Vec<&UnitId>) = if let Some(project) = registry.project(&id) {
            (project.licenses.as_slice(), project.all_dependencies().collect())
        } else if let Some(other) = registry.distribution(&id) {
            (other.licenses.as_slice(), other.all_dependencies().into_iter().collect())
        } else if let Some(library) = registry.library(&id) {
            (library.licenses.as_slice(), Vec::new())
        } else {
            continue;
        };

        for license in own {
            if !declared.contains(license.as_str()) {
                warnings.push(
                    Diagnostic::warning(format!(
                        "`{}` is licensed under `{}`, which `{}` does not declare",
                        id, license, dist.id
                    ))
                    .with_suggestion(format!("Add `{}` to the license list of `{}`", license, dist.id)),
                );
            }
            licenses.insert(license.clone());
        }

        let mut next: Vec<UnitId> = next.into_iter().cloned().collect();
        next.sort();
        stack.extend(next.into_iter().rev());
    }

    for license in &licenses {
        if registry.license(license).is_none() {
            warnings.push(
                Diagnostic::warning(format!(
                    "license `{}` used by `{}` is not declared by any loaded suite",
                    license, dist.id
                ))
                .with_suggestion(format!("Declare it under [licenses.\"{}\"]", license)),
            );
        }
    }

    LicenseReport {
        distribution: dist.id.clone(),
        licenses,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Suite;
    use std::path::Path;

    fn registry(doc: &str) -> Registry {
        let suite = Suite::parse(doc, Path::new("/s/suite.toml")).unwrap();
        Registry::from_suites(vec![suite]).unwrap()
    }

    const DOC: &str = r#"
[suite]
name = "s"

[licenses.MIT]
name = "MIT License"
[licenses."EPL-1.0"]
name = "Eclipse Public License 1.0"
[licenses.BSD-new]
name = "New BSD License"

[libraries.JONI]
path = "joni.jar"
sha256 = "0000000000000000000000000000000000000000000000000000000000000000"
license = ["MIT"]

[libraries.SNAKEYAML]
path = "snakeyaml.jar"
sha256 = "0000000000000000000000000000000000000000000000000000000000000000"
license = ["Apache-2.0"]

[projects.core]
dependencies = ["JONI"]
license = ["EPL-1.0"]

[projects.yaml]
dependencies = ["SNAKEYAML"]
license = ["EPL-1.0"]

[distributions.SHARED]
dependencies = ["core"]
license = ["EPL-1.0", "MIT", "BSD-new"]

[distributions.RUBY]
dependencies = ["yaml"]
dist_dependencies = ["SHARED"]
exclude = ["SNAKEYAML"]
license = ["EPL-1.0"]
"#;

    #[test]
    fn test_collects_transitively() {
        let reg = registry(DOC);
        let dist = reg.distribution(&UnitId::new("s", "RUBY")).unwrap();
        let report = collect(&reg, dist);

        let licenses: Vec<_> = report.licenses.iter().map(String::as_str).collect();
        // Apache-2.0 only arrives through the excluded library.
        assert_eq!(licenses, vec!["BSD-new", "EPL-1.0", "MIT"]);
    }

    #[test]
    fn test_warns_about_undeclared_constituent_licenses() {
        let reg = registry(DOC);
        let dist = reg.distribution(&UnitId::new("s", "RUBY")).unwrap();
        let report = collect(&reg, dist);

        let messages: Vec<_> = report.warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("`s:JONI` is licensed under `MIT`")));
        assert!(!messages.iter().any(|m| m.contains("Apache")));
    }

    #[test]
    fn test_warns_about_unknown_license_ids() {
        let reg = registry(DOC);
        let dist = reg.distribution(&UnitId::new("s", "SHARED")).unwrap();
        assert!(collect(&reg, dist).warnings.is_empty());

        let reg = registry(&DOC.replace("exclude = [\"SNAKEYAML\"]", ""));
        let dist = reg.distribution(&UnitId::new("s", "RUBY")).unwrap();
        let report = collect(&reg, dist);
        assert!(report.licenses.contains("Apache-2.0"));
        assert!(report
            .warnings
            .iter()
            .any(|w| w.message.contains("license `Apache-2.0` used by `s:RUBY` is not declared")));
    }
}
