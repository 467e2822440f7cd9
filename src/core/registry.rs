//! Suite registry.
//!
//! Loads the root suite and, breadth-first, every suite it imports. The
//! result is frozen: nothing is added or changed after [`Registry::load`]
//! returns.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::core::descriptor::DESCRIPTOR_NAME;
use crate::core::suite::{Distribution, Library, License, Project, Suite, SuiteRef};
use crate::core::unit_id::UnitId;
use crate::resolver::errors::ResolveError;
use crate::sources::{FetchRequest, Fetcher, SuiteCache};

/// All suites reachable from the root, keyed by suite name.
#[derive(Debug)]
pub struct Registry {
    root: String,
    suites: BTreeMap<String, Suite>,
}

impl Registry {
    /// Load `root_descriptor` and its imports.
    pub fn load(root_descriptor: &Path, fetcher: &dyn Fetcher) -> Result<Registry, ResolveError> {
        let root = Suite::load(root_descriptor)?;
        tracing::debug!("loaded root suite `{}` from {}", root.name, root_descriptor.display());

        let cache = SuiteCache::new();
        let root_name = root.name.clone();
        let root_version = root.version.clone();

        // suite name -> (importer, version) of the declaration that loaded it
        let mut pinned: HashMap<String, (String, String)> = HashMap::new();
        let mut queue: VecDeque<(String, SuiteRef)> = root
            .imports
            .iter()
            .map(|import| (root_name.clone(), import.clone()))
            .collect();

        let mut suites = BTreeMap::new();
        suites.insert(root_name.clone(), root);

        while let Some((importer, import)) = queue.pop_front() {
            if import.name == root_name {
                match &root_version {
                    Some(version) if *version != import.version => {
                        return Err(ResolveError::DuplicateSuite {
                            suite: import.name,
                            versions: vec![
                                ("<root>".to_string(), version.clone()),
                                (importer, import.version),
                            ],
                        });
                    }
                    _ => continue,
                }
            }

            if let Some((first_importer, version)) = pinned.get(&import.name) {
                if *version == import.version {
                    continue;
                }
                return Err(ResolveError::DuplicateSuite {
                    suite: import.name.clone(),
                    versions: vec![
                        (first_importer.clone(), version.clone()),
                        (importer, import.version),
                    ],
                });
            }

            let descriptor = locate(&import, &importer, fetcher, &cache)?;
            let suite = Suite::load(&descriptor)?;
            if suite.name != import.name {
                return Err(ResolveError::invalid(
                    descriptor,
                    format!(
                        "`{}` imports suite `{}`, but the descriptor declares `{}`",
                        importer, import.name, suite.name
                    ),
                ));
            }
            tracing::debug!("loaded suite `{}` at {}", suite.name, import.version);

            for nested in &suite.imports {
                queue.push_back((suite.name.clone(), nested.clone()));
            }
            pinned.insert(import.name.clone(), (importer, import.version.clone()));
            suites.insert(suite.name.clone(), suite);
        }

        Ok(Registry {
            root: root_name,
            suites,
        })
    }

    /// Build a registry from already-loaded suites; the first is the root.
    pub fn from_suites(suites: Vec<Suite>) -> Option<Registry> {
        let root = suites.first()?.name.clone();
        let suites = suites.into_iter().map(|s| (s.name.clone(), s)).collect();
        Some(Registry { root, suites })
    }

    /// The suite the build was started from.
    pub fn root_suite(&self) -> &Suite {
        // The root is inserted before anything else and never removed.
        &self.suites[&self.root]
    }

    pub fn suite(&self, name: &str) -> Option<&Suite> {
        self.suites.get(name)
    }

    /// All loaded suites in name order.
    pub fn suites(&self) -> impl Iterator<Item = &Suite> {
        self.suites.values()
    }

    pub fn project(&self, id: &UnitId) -> Option<&Project> {
        self.suite(id.suite())?.projects.get(id)
    }

    pub fn distribution(&self, id: &UnitId) -> Option<&Distribution> {
        self.suite(id.suite())?.distributions.get(id)
    }

    pub fn library(&self, id: &UnitId) -> Option<&Library> {
        self.suite(id.suite())?.libraries.get(id)
    }

    /// A license declared by any loaded suite.
    pub fn license(&self, id: &str) -> Option<&License> {
        self.suites().find_map(|s| s.licenses.get(id))
    }

    /// Whether `id` names a project or distribution.
    pub fn is_unit(&self, id: &UnitId) -> bool {
        self.suite(id.suite()).is_some_and(|s| s.declares_unit(id))
    }

    /// Every project and distribution of every loaded suite.
    pub fn units(&self) -> impl Iterator<Item = &UnitId> {
        self.suites()
            .flat_map(|s| s.projects.keys().chain(s.distributions.keys()))
    }
}

/// Find the descriptor of an imported suite: a local `path` first, then each
/// URL in declaration order.
fn locate(
    import: &SuiteRef,
    importer: &str,
    fetcher: &dyn Fetcher,
    cache: &SuiteCache,
) -> Result<PathBuf, ResolveError> {
    let descriptor_in = |checkout: &Path| {
        let dir = if import.subdir {
            checkout.join(&import.name)
        } else {
            checkout.to_path_buf()
        };
        dir.join(DESCRIPTOR_NAME)
    };

    let mut attempts = Vec::new();

    if let Some(path) = &import.path {
        let descriptor = descriptor_in(path);
        if descriptor.is_file() {
            return Ok(descriptor);
        }
        attempts.push(format!("path {}: no {}", path.display(), DESCRIPTOR_NAME));
    }

    for url in &import.urls {
        let request = FetchRequest {
            name: import.name.clone(),
            version: import.version.clone(),
            url: url.url.clone(),
            kind: url.kind,
        };
        // A checkout without a descriptor is a failed fetch, so the slot stays
        // empty for the next URL.
        let fetched = cache.get_or_try_init(&import.name, &import.version, || {
            let checkout = fetcher.fetch(&request)?;
            if !descriptor_in(&checkout).is_file() {
                anyhow::bail!("no {} in checkout", DESCRIPTOR_NAME);
            }
            Ok(checkout)
        });
        match fetched {
            Ok(checkout) => return Ok(descriptor_in(&checkout)),
            Err(e) => {
                tracing::debug!("fetching {} from {} failed: {:#}", import.name, url.url, e);
                attempts.push(format!("{} ({}): {:#}", url.url, url.kind, e));
            }
        }
    }

    Err(ResolveError::UnresolvedImport {
        suite: import.name.clone(),
        version: import.version.clone(),
        importer: importer.to_string(),
        attempts,
    })
}
