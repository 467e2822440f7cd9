//! Implementation of `suitebuild order`.

use anyhow::Result;
use serde::Serialize;

use crate::core::UnitId;
use crate::ops::workspace::{Overrides, Workspace};
use crate::resolver::{resolve, UnitKind};
use crate::util::GlobalContext;

/// One line of the build order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderEntry {
    pub unit: UnitId,
    pub kind: UnitKind,
    pub dependencies: Vec<UnitId>,
}

/// Resolve the build order without building anything.
pub fn order(gctx: &GlobalContext, targets: &[String], offline: bool) -> Result<Vec<OrderEntry>> {
    let overrides = Overrides {
        offline,
        ..Overrides::default()
    };
    let ws = Workspace::load(gctx, &overrides)?;
    let targets = ws.parse_targets(targets);
    let order = resolve(ws.registry(), &targets)?;

    Ok(order
        .units()
        .iter()
        .map(|unit| OrderEntry {
            unit: unit.id.clone(),
            kind: unit.kind,
            dependencies: unit.deps.iter().cloned().collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::SuiteFixture;
    use tempfile::TempDir;

    #[test]
    fn test_worked_example() {
        let tmp = TempDir::new().unwrap();
        let root = SuiteFixture::new("s")
            .with_descriptor(
                r#"
[suite]
name = "s"
[distributions.D1]
dependencies = ["P1", "P2"]
[projects.P2]
dependencies = ["P1"]
[projects.P1]
"#,
            )
            .write_to(&tmp.path().join("s"))
            .unwrap();
        let gctx = GlobalContext::with_cwd(root)
            .unwrap()
            .with_home(tmp.path().join("home"));

        let entries = order(&gctx, &[], false).unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.unit.to_string()).collect();
        assert_eq!(ids, vec!["s:P1", "s:P2", "s:D1"]);
        assert_eq!(entries[2].kind, UnitKind::Distribution);
        assert_eq!(entries[2].dependencies.len(), 2);
    }
}
