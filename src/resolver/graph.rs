//! Build graph and deterministic build order.
//!
//! Projects and distributions are nodes; an edge points from a dependency to
//! its dependent. The order is Kahn's algorithm with a min-heap ready set, so
//! among independent units the lexicographically smallest [`UnitId`] always
//! comes first.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use crate::core::{LayoutSource, Registry, UnitId};
use crate::resolver::errors::ResolveError;

/// Whether a build unit is a project or a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Project,
    Distribution,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Project => "project",
            UnitKind::Distribution => "distribution",
        }
    }
}

/// One node of the resolved order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildUnit {
    pub id: UnitId,
    pub kind: UnitKind,
    /// Units that must finish first.
    pub deps: BTreeSet<UnitId>,
    /// Libraries referenced directly by this unit.
    pub libraries: BTreeSet<UnitId>,
}

/// Units in an order where every unit follows all of its dependencies.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildOrder {
    units: Vec<BuildUnit>,
}

impl BuildOrder {
    pub fn units(&self) -> &[BuildUnit] {
        &self.units
    }

    pub fn ids(&self) -> impl Iterator<Item = &UnitId> {
        self.units.iter().map(|u| &u.id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, id: &UnitId) -> Option<&BuildUnit> {
        self.units.iter().find(|u| &u.id == id)
    }

    /// Every library referenced by any unit.
    pub fn libraries(&self) -> BTreeSet<&UnitId> {
        self.units.iter().flat_map(|u| u.libraries.iter()).collect()
    }

    /// All units `id` depends on, directly or not.
    pub fn transitive_deps(&self, id: &UnitId) -> BTreeSet<UnitId> {
        let by_id: HashMap<&UnitId, &BuildUnit> = self.units.iter().map(|u| (&u.id, u)).collect();
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&UnitId> = by_id
            .get(id)
            .map(|u| u.deps.iter().collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                if let Some(unit) = by_id.get(next) {
                    stack.extend(unit.deps.iter());
                }
            }
        }
        seen
    }
}

/// Resolve the build order for `targets`, or for every unit of the root
/// suite when `targets` is empty.
pub fn resolve(registry: &Registry, targets: &[UnitId]) -> Result<BuildOrder, ResolveError> {
    let roots: Vec<UnitId> = if targets.is_empty() {
        let root = registry.root_suite();
        root.projects
            .keys()
            .chain(root.distributions.keys())
            .cloned()
            .collect()
    } else {
        for target in targets {
            if !registry.is_unit(target) {
                return Err(ResolveError::UnknownTarget {
                    target: target.to_string(),
                });
            }
        }
        targets.to_vec()
    };

    let units = collect_closure(registry, roots)?;
    let units = order(units)?;
    tracing::debug!("resolved {} build units", units.len());
    Ok(BuildOrder { units })
}

/// Walk from the roots and classify every dependency edge.
fn collect_closure(
    registry: &Registry,
    roots: Vec<UnitId>,
) -> Result<BTreeMap<UnitId, BuildUnit>, ResolveError> {
    let mut units = BTreeMap::new();
    let mut queue: VecDeque<UnitId> = roots.into_iter().collect();

    while let Some(id) = queue.pop_front() {
        if units.contains_key(&id) {
            continue;
        }

        let (kind, refs): (UnitKind, Vec<&UnitId>) = if let Some(project) = registry.project(&id) {
            (UnitKind::Project, project.all_dependencies().collect())
        } else if let Some(dist) = registry.distribution(&id) {
            check_layout(registry, &id)?;
            (UnitKind::Distribution, dist.all_dependencies().into_iter().collect())
        } else {
            // Only reachable for ids that were checked by the caller.
            return Err(ResolveError::UnknownTarget {
                target: id.to_string(),
            });
        };

        let mut deps = BTreeSet::new();
        let mut libraries = BTreeSet::new();
        for dep in refs {
            if registry.is_unit(dep) {
                deps.insert(dep.clone());
                queue.push_back(dep.clone());
            } else if registry.library(dep).is_some() {
                libraries.insert(dep.clone());
            } else {
                return Err(ResolveError::MissingDependency {
                    id: dep.clone(),
                    referrer: id.clone(),
                });
            }
        }

        units.insert(
            id.clone(),
            BuildUnit {
                id,
                kind,
                deps,
                libraries,
            },
        );
    }

    Ok(units)
}

/// `dependency:` sources must name projects and `extracted-dependency:`
/// sources distributions.
fn check_layout(registry: &Registry, id: &UnitId) -> Result<(), ResolveError> {
    let Some(dist) = registry.distribution(id) else {
        return Ok(());
    };
    for entry in dist.layout.entries() {
        let (unit, want_dist) = match &entry.source {
            LayoutSource::File { .. } => continue,
            LayoutSource::Dependency { unit, .. } => (unit, false),
            LayoutSource::ExtractedDependency { unit, .. } => (unit, true),
        };
        let wrong_kind = if want_dist {
            registry.project(unit).is_some()
        } else {
            registry.distribution(unit).is_some()
        };
        if wrong_kind {
            let descriptor = registry
                .suite(id.suite())
                .map(|s| s.descriptor_path.clone())
                .unwrap_or_default();
            return Err(ResolveError::invalid(
                descriptor,
                format!(
                    "distribution `{}`: layout source `{}` must refer to a {}",
                    id,
                    entry.source,
                    if want_dist { "distribution" } else { "project" }
                ),
            ));
        }
    }
    Ok(())
}

/// Kahn's algorithm over the collected units.
fn order(mut units: BTreeMap<UnitId, BuildUnit>) -> Result<Vec<BuildUnit>, ResolveError> {
    let mut graph: DiGraph<UnitId, ()> = DiGraph::new();
    let mut index: HashMap<UnitId, NodeIndex> = HashMap::new();
    for id in units.keys() {
        index.insert(id.clone(), graph.add_node(id.clone()));
    }
    for unit in units.values() {
        for dep in &unit.deps {
            graph.add_edge(index[dep], index[&unit.id], ());
        }
    }

    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<UnitId>> = units
        .values()
        .filter(|u| u.deps.is_empty())
        .map(|u| Reverse(u.id.clone()))
        .collect();

    let mut ordered = Vec::with_capacity(units.len());
    while let Some(Reverse(id)) = ready.pop() {
        let node = index[&id];
        for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(graph[dependent].clone()));
                }
            }
        }
        if let Some(unit) = units.remove(&id) {
            ordered.push(unit);
        }
    }

    if !units.is_empty() {
        return Err(ResolveError::CyclicDependency {
            cycle: find_cycle(&graph),
        });
    }

    Ok(ordered)
}

/// Report one cycle as a closed path `a -> b -> ... -> a`, where each arrow
/// reads "depends on".
///
/// The strongly connected component holding the smallest cyclic unit is
/// chosen, and the path starts at that unit.
fn find_cycle(graph: &DiGraph<UnitId, ()>) -> Vec<UnitId> {
    let cyclic = tarjan_scc(graph).into_iter().filter(|scc| {
        scc.len() > 1 || graph.contains_edge(scc[0], scc[0])
    });
    let Some(start) = cyclic
        .flat_map(|scc| scc.into_iter())
        .min_by(|a, b| graph[*a].cmp(&graph[*b]))
    else {
        return Vec::new();
    };

    // Breadth-first along dependency edges until we come back to `start`.
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let mut deps: Vec<NodeIndex> = graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();
        deps.sort_by(|a, b| graph[*a].cmp(&graph[*b]));

        for dep in deps {
            if dep == start {
                let mut path = vec![graph[start].clone()];
                let mut trail = vec![node];
                let mut cursor = node;
                while let Some(prev) = parent.get(&cursor) {
                    trail.push(*prev);
                    cursor = *prev;
                }
                // trail runs node -> ... -> start; the last element is start.
                trail.pop();
                path.extend(trail.into_iter().rev().map(|n| graph[n].clone()));
                path.push(graph[start].clone());
                return path;
            }
            if !parent.contains_key(&dep) {
                parent.insert(dep, node);
                queue.push_back(dep);
            }
        }
    }

    vec![graph[start].clone()]
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

    fn ids(order: &BuildOrder) -> Vec<String> {
        order.ids().map(|id| id.name().to_string()).collect()
    }

    #[test]
    fn test_worked_example() {
        let reg = registry(
            r#"
[suite]
name = "s"
[projects.P1]
[projects.P2]
dependencies = ["P1"]
[distributions.D1]
dependencies = ["P1", "P2"]
"#,
        );
        let order = resolve(&reg, &[]).unwrap();
        assert_eq!(ids(&order), vec!["P1", "P2", "D1"]);

        let d1 = order.get(&UnitId::new("s", "D1")).unwrap();
        assert_eq!(d1.kind, UnitKind::Distribution);
        assert_eq!(d1.deps.len(), 2);
    }

    #[test]
    fn test_lexicographic_tie_break() {
        let reg = registry(
            r#"
[suite]
name = "s"
[projects.zeta]
[projects.alpha]
[projects.mid]
dependencies = ["zeta"]
"#,
        );
        let order = resolve(&reg, &[]).unwrap();
        assert_eq!(ids(&order), vec!["alpha", "zeta", "mid"]);
    }

    #[test]
    fn test_every_unit_follows_its_deps() {
        let reg = registry(
            r#"
[suite]
name = "s"
[projects.a]
dependencies = ["d", "c"]
[projects.b]
dependencies = ["a"]
[projects.c]
[projects.d]
dependencies = ["c"]
[distributions.E]
dependencies = ["b"]
dist_dependencies = ["F"]
[distributions.F]
dependencies = ["c"]
"#,
        );
        let order = resolve(&reg, &[]).unwrap();
        let position: HashMap<_, _> = order.ids().enumerate().map(|(i, id)| (id.clone(), i)).collect();
        for unit in order.units() {
            for dep in &unit.deps {
                assert!(position[dep] < position[&unit.id], "{} before {}", dep, unit.id);
            }
        }
        assert_eq!(order.len(), 6);
    }

    #[test]
    fn test_cycle_reports_closed_path() {
        let reg = registry(
            r#"
[suite]
name = "s"
[projects.A]
dependencies = ["B"]
[projects.B]
dependencies = ["C"]
[projects.C]
dependencies = ["A"]
[projects.ok]
"#,
        );
        match resolve(&reg, &[]).unwrap_err() {
            ResolveError::CyclicDependency { cycle } => {
                let names: Vec<_> = cycle.iter().map(|id| id.name()).collect();
                assert_eq!(names, vec!["A", "B", "C", "A"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_self_cycle() {
        let reg = registry("[suite]\nname = \"s\"\n[projects.A]\ndependencies = [\"A\"]\n");
        match resolve(&reg, &[]).unwrap_err() {
            ResolveError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec![UnitId::new("s", "A"), UnitId::new("s", "A")]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_dependency() {
        let reg = registry("[suite]\nname = \"s\"\n[projects.A]\ndependencies = [\"other:GONE\"]\n");
        match resolve(&reg, &[]).unwrap_err() {
            ResolveError::MissingDependency { id, referrer } => {
                assert_eq!(id, UnitId::new("other", "GONE"));
                assert_eq!(referrer, UnitId::new("s", "A"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_libraries_are_not_units() {
        let reg = registry(&format!(
            "[suite]\nname = \"s\"\n[libraries.JONI]\npath = \"joni.jar\"\nsha256 = \"{}\"\n[projects.A]\ndependencies = [\"JONI\"]\n",
            "0".repeat(64)
        ));
        let order = resolve(&reg, &[]).unwrap();
        assert_eq!(ids(&order), vec!["A"]);
        assert!(order.units()[0].libraries.contains(&UnitId::new("s", "JONI")));
    }

    #[test]
    fn test_targets_restrict_closure() {
        let reg = registry(
            r#"
[suite]
name = "s"
[projects.P1]
[projects.P2]
dependencies = ["P1"]
[projects.unrelated]
"#,
        );
        let order = resolve(&reg, &[UnitId::new("s", "P2")]).unwrap();
        assert_eq!(ids(&order), vec!["P1", "P2"]);
        assert_eq!(order.transitive_deps(&UnitId::new("s", "P2")).len(), 1);

        let err = resolve(&reg, &[UnitId::new("s", "nope")]).unwrap_err();
        assert!(matches!(err, ResolveError::UnknownTarget { .. }));
    }

    #[test]
    fn test_layout_source_kinds_are_checked() {
        let reg = registry(
            r#"
[suite]
name = "s"
[projects.P]
[distributions.D.layout]
"./" = "extracted-dependency:P/*"
"#,
        );
        let err = resolve(&reg, &[]).unwrap_err();
        assert!(err.to_string().contains("must refer to a distribution"));
    }
}
