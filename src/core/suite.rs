//! Validated suite model.
//!
//! [`Suite::load`] reads a `suite.toml`, checks it, and produces immutable
//! value types. References are qualified to [`UnitId`]s here, so later stages
//! never deal with bare names.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use semver::VersionReq;
use serde::Serialize;

use crate::core::descriptor::{RawDescriptor, RawDistribution, RawLibrary, RawMaven, RawProject};
use crate::core::layout::{Layout, LayoutEntry};
use crate::core::unit_id::UnitId;
use crate::resolver::errors::ResolveError;
use crate::sources::FetchKind;

/// A declared import of another suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteRef {
    pub name: String,
    /// Commit or tag that pins the imported content.
    pub version: String,
    pub urls: Vec<ImportUrl>,
    pub subdir: bool,
    /// Local checkout, already resolved against the importing suite's root.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportUrl {
    pub url: String,
    pub kind: FetchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
}

/// A prebuilt binary dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Library {
    pub id: UnitId,
    pub maven: Option<RawMaven>,
    pub url: Option<String>,
    /// Local file, already resolved against the suite root.
    pub path: Option<PathBuf>,
    pub sha256: String,
    pub source_sha256: Option<String>,
    pub licenses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpec {
    pub source_dirs: Vec<String>,
    /// File extensions to compile; empty means every file.
    pub extensions: Vec<String>,
    /// Compiler template; empty means use the configured toolchain.
    pub compiler: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeSpec {
    pub command: Vec<String>,
    pub build_env: BTreeMap<String, String>,
    pub build_dependencies: Vec<UnitId>,
    pub results: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSpec {
    pub output_dir: PathBuf,
    pub prefix: Option<String>,
}

/// How a project is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProjectKind {
    Source(SourceSpec),
    Native(NativeSpec),
    Archive(ArchiveSpec),
}

impl ProjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectKind::Source(_) => "source",
            ProjectKind::Native(_) => "native",
            ProjectKind::Archive(_) => "archive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: UnitId,
    pub dir: PathBuf,
    pub kind: ProjectKind,
    pub dependencies: Vec<UnitId>,
    pub compliance: Option<VersionReq>,
    pub licenses: Vec<String>,
}

impl Project {
    /// Every unit this project needs before it can build: declared
    /// dependencies plus native build dependencies.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &UnitId> {
        let build_deps: &[UnitId] = match &self.kind {
            ProjectKind::Native(native) => &native.build_dependencies,
            _ => &[],
        };
        self.dependencies.iter().chain(build_deps.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Distribution {
    pub id: UnitId,
    /// Directory `file:` layout sources are relative to.
    pub root: PathBuf,
    pub dependencies: Vec<UnitId>,
    pub dist_dependencies: Vec<UnitId>,
    pub native: bool,
    pub platform_dependent: bool,
    pub layout: Layout,
    pub licenses: Vec<String>,
    pub description: Option<String>,
    /// Units whose licenses are not propagated into this distribution.
    pub exclude: Vec<UnitId>,
}

impl Distribution {
    /// Units that must be built before this distribution is assembled.
    pub fn all_dependencies(&self) -> BTreeSet<&UnitId> {
        self.dependencies
            .iter()
            .chain(self.dist_dependencies.iter())
            .chain(self.layout.referenced_units())
            .collect()
    }
}

/// One loaded and validated suite.
#[derive(Debug, Clone, Serialize)]
pub struct Suite {
    pub name: String,
    pub version: Option<String>,
    pub root: PathBuf,
    pub descriptor_path: PathBuf,
    pub imports: Vec<SuiteRef>,
    pub licenses: BTreeMap<String, License>,
    pub libraries: BTreeMap<UnitId, Library>,
    pub projects: BTreeMap<UnitId, Project>,
    pub distributions: BTreeMap<UnitId, Distribution>,
}

impl Suite {
    /// Load and validate a descriptor file.
    pub fn load(descriptor_path: &Path) -> Result<Suite, ResolveError> {
        let contents = std::fs::read_to_string(descriptor_path)
            .map_err(|e| ResolveError::invalid(descriptor_path, format!("cannot read file: {}", e)))?;
        Suite::parse(&contents, descriptor_path)
    }

    /// Parse and validate descriptor text as if read from `descriptor_path`.
    pub fn parse(contents: &str, descriptor_path: &Path) -> Result<Suite, ResolveError> {
        let raw: RawDescriptor =
            toml::from_str(contents).map_err(|e| ResolveError::invalid(descriptor_path, e.to_string()))?;
        let root = descriptor_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let suite = raw.suite.name.clone();
        Loader {
            path: descriptor_path,
            root: &root,
            suite: &suite,
        }
        .validate(raw)
    }

    /// Whether `id` names a project or distribution of this suite.
    pub fn declares_unit(&self, id: &UnitId) -> bool {
        self.projects.contains_key(id) || self.distributions.contains_key(id)
    }
}

struct Loader<'a> {
    path: &'a Path,
    root: &'a Path,
    suite: &'a str,
}

impl Loader<'_> {
    fn err(&self, message: impl Into<String>) -> ResolveError {
        ResolveError::invalid(self.path, message)
    }

    fn qualify(&self, refs: &[String]) -> Vec<UnitId> {
        refs.iter().map(|r| UnitId::parse_ref(r, self.suite)).collect()
    }

    fn validate(&self, raw: RawDescriptor) -> Result<Suite, ResolveError> {
        if raw.suite.name.is_empty() || raw.suite.name.contains(':') {
            return Err(self.err(format!("invalid suite name `{}`", raw.suite.name)));
        }

        let imports = raw
            .imports
            .into_iter()
            .map(|import| {
                if import.urls.is_empty() && import.path.is_none() {
                    return Err(self.err(format!(
                        "import `{}` needs at least one url or a path",
                        import.name
                    )));
                }
                Ok(SuiteRef {
                    name: import.name,
                    version: import.version,
                    urls: import
                        .urls
                        .into_iter()
                        .map(|u| ImportUrl { url: u.url, kind: u.kind })
                        .collect(),
                    subdir: import.subdir,
                    path: import.path.map(|p| self.root.join(p)),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let licenses = raw
            .licenses
            .into_iter()
            .map(|(id, l)| {
                let license = License {
                    id: id.clone(),
                    name: l.name,
                    url: l.url,
                };
                (id, license)
            })
            .collect();

        let mut seen = BTreeSet::new();
        let mut claim = |name: &str, what: &str| -> Result<(), ResolveError> {
            if name.is_empty() || name.contains(':') || name.contains('/') {
                return Err(self.err(format!("invalid {} name `{}`", what, name)));
            }
            if !seen.insert(name.to_string()) {
                return Err(self.err(format!("`{}` is declared more than once", name)));
            }
            Ok(())
        };

        let mut libraries = BTreeMap::new();
        for (name, lib) in raw.libraries {
            claim(&name, "library")?;
            let library = self.library(&name, lib)?;
            libraries.insert(library.id.clone(), library);
        }

        let mut projects = BTreeMap::new();
        for (name, project) in raw.projects {
            claim(&name, "project")?;
            let project = self.project(&name, project)?;
            projects.insert(project.id.clone(), project);
        }

        let mut distributions = BTreeMap::new();
        for (name, dist) in raw.distributions {
            claim(&name, "distribution")?;
            let dist = self.distribution(&name, dist)?;
            distributions.insert(dist.id.clone(), dist);
        }

        Ok(Suite {
            name: raw.suite.name,
            version: raw.suite.version,
            root: self.root.to_path_buf(),
            descriptor_path: self.path.to_path_buf(),
            imports,
            licenses,
            libraries,
            projects,
            distributions,
        })
    }

    fn library(&self, name: &str, raw: RawLibrary) -> Result<Library, ResolveError> {
        if raw.sha256.len() != 64 || !raw.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(self.err(format!(
                "library `{}` has a malformed sha256 `{}`",
                name, raw.sha256
            )));
        }
        Ok(Library {
            id: UnitId::new(self.suite, name),
            maven: raw.maven,
            url: raw.url,
            path: raw.path.map(|p| self.root.join(p)),
            sha256: raw.sha256.to_ascii_lowercase(),
            source_sha256: raw.source_sha256,
            licenses: raw.license,
        })
    }

    fn project(&self, name: &str, raw: RawProject) -> Result<Project, ResolveError> {
        let kind = match raw.kind.as_deref().unwrap_or("source") {
            "source" => {
                let source_dirs = if raw.source_dirs.is_empty() {
                    vec!["src".to_string()]
                } else {
                    raw.source_dirs
                };
                ProjectKind::Source(SourceSpec {
                    source_dirs,
                    extensions: raw
                        .extensions
                        .into_iter()
                        .map(|e| e.trim_start_matches('.').to_string())
                        .collect(),
                    compiler: raw.compiler,
                })
            }
            "native" => {
                if raw.command.is_empty() {
                    return Err(self.err(format!("native project `{}` has no `command`", name)));
                }
                ProjectKind::Native(NativeSpec {
                    command: raw.command,
                    build_env: raw.build_env,
                    build_dependencies: self.qualify(&raw.build_dependencies),
                    results: raw.results,
                })
            }
            "archive" => {
                let output_dir = raw.output_dir.ok_or_else(|| {
                    self.err(format!("archive project `{}` has no `output_dir`", name))
                })?;
                ProjectKind::Archive(ArchiveSpec {
                    output_dir,
                    prefix: raw.prefix,
                })
            }
            other => {
                return Err(self.err(format!(
                    "project `{}` has unknown kind `{}` (expected source, native or archive)",
                    name, other
                )))
            }
        };

        let compliance = raw
            .compliance
            .map(|req| {
                VersionReq::parse(&req).map_err(|e| {
                    self.err(format!(
                        "project `{}` has an invalid compliance requirement `{}`: {}",
                        name, req, e
                    ))
                })
            })
            .transpose()?;

        let dir = self.root.join(raw.dir.unwrap_or_else(|| PathBuf::from(name)));

        Ok(Project {
            id: UnitId::new(self.suite, name),
            dir,
            kind,
            dependencies: self.qualify(&raw.dependencies),
            compliance,
            licenses: raw.license,
        })
    }

    fn distribution(&self, name: &str, raw: RawDistribution) -> Result<Distribution, ResolveError> {
        let mut entries = Vec::new();
        for (destination, value) in raw.layout {
            for entry in value.into_entries() {
                let entry = LayoutEntry::from_raw(&destination, entry, self.suite)
                    .map_err(|e| self.err(format!("distribution `{}`: {}", name, e)))?;
                entries.push(entry);
            }
        }

        Ok(Distribution {
            id: UnitId::new(self.suite, name),
            root: self.root.to_path_buf(),
            dependencies: self.qualify(&raw.dependencies),
            dist_dependencies: self.qualify(&raw.dist_dependencies),
            native: raw.native,
            platform_dependent: raw.platform_dependent,
            layout: Layout::new(entries),
            licenses: raw.license,
            description: raw.description,
            exclude: self.qualify(&raw.exclude),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
[suite]
name = "ruby"

[[imports]]
name = "sulong"
version = "abc"
path = "../graal/sulong"

[licenses.MIT]
name = "MIT License"

[libraries.JONI]
url = "https://example.com/joni.jar"
sha256 = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"
license = ["MIT"]

[projects.shared]
source_dirs = ["src/main/java"]
extensions = [".java"]
dependencies = ["JONI"]
compliance = ">=1.8"

[projects.cext]
kind = "native"
dir = "src/main/c"
command = ["make"]
build_dependencies = ["sulong:SULONG_LIBS"]
results = ["libtrufflerubytrampoline.so"]

[projects.core]
kind = "archive"
output_dir = "src/main/ruby"
prefix = "truffleruby"

[distributions.RUBY]
dependencies = ["shared", "core"]
license = ["MIT"]

[distributions.RUBY.layout]
"lib/" = ["file:lib/*.rb", "extracted-dependency:sulong:SULONG_LIBS/include"]
"#;

    #[test]
    fn test_load_qualifies_references() {
        let path = Path::new("/work/ruby/suite.toml");
        let suite = Suite::parse(SUITE, path).unwrap();

        assert_eq!(suite.name, "ruby");
        assert_eq!(suite.root, Path::new("/work/ruby"));
        assert_eq!(
            suite.imports[0].path.as_deref(),
            Some(Path::new("/work/ruby/../graal/sulong"))
        );

        let shared = &suite.projects[&UnitId::new("ruby", "shared")];
        assert_eq!(shared.dependencies, vec![UnitId::new("ruby", "JONI")]);
        assert_eq!(shared.dir, Path::new("/work/ruby/shared"));
        assert!(matches!(&shared.kind, ProjectKind::Source(s) if s.extensions == vec!["java"]));
        assert!(shared.compliance.is_some());

        let cext = &suite.projects[&UnitId::new("ruby", "cext")];
        let deps: Vec<_> = cext.all_dependencies().cloned().collect();
        assert_eq!(deps, vec![UnitId::new("sulong", "SULONG_LIBS")]);

        let joni = &suite.libraries[&UnitId::new("ruby", "JONI")];
        assert_eq!(joni.sha256, "a".repeat(64));

        let dist = &suite.distributions[&UnitId::new("ruby", "RUBY")];
        let all: Vec<_> = dist.all_dependencies().into_iter().cloned().collect();
        assert_eq!(
            all,
            vec![
                UnitId::new("ruby", "core"),
                UnitId::new("ruby", "shared"),
                UnitId::new("sulong", "SULONG_LIBS"),
            ]
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let doc = "[suite]\nname = \"s\"\n[projects.p]\nkind = \"gradle\"\n";
        let err = Suite::parse(doc, Path::new("/s/suite.toml")).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidDescriptor { .. }));
        assert!(err.to_string().contains("unknown kind `gradle`"));
    }

    #[test]
    fn test_bad_compliance_is_rejected() {
        let doc = "[suite]\nname = \"s\"\n[projects.p]\ncompliance = \"not a version\"\n";
        let err = Suite::parse(doc, Path::new("/s/suite.toml")).unwrap_err();
        assert!(err.to_string().contains("invalid compliance requirement"));
    }

    #[test]
    fn test_malformed_layout_is_rejected() {
        let doc = "[suite]\nname = \"s\"\n[distributions.D.layout]\n\"x/\" = \"nowhere\"\n";
        let err = Suite::parse(doc, Path::new("/s/suite.toml")).unwrap_err();
        assert!(err.to_string().contains("distribution `D`"));
    }

    #[test]
    fn test_shared_namespace() {
        let doc = r#"
[suite]
name = "s"
[projects.X]
[distributions.X]
"#;
        let err = Suite::parse(doc, Path::new("/s/suite.toml")).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }
}
