//! Project builds.
//!
//! Each project kind implements one capability trait:
//! source projects are [`Compilable`], native projects are
//! [`NativeBuildable`] and archive projects are [`ArchivePackageable`].
//! [`ProjectBuilder`] dispatches on the kind and owns the parts every kind
//! shares: the compliance check and a clean output directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{anyhow, Context};
use regex::Regex;

use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::core::suite::{ArchiveSpec, NativeSpec, SourceSpec};
use crate::core::{Project, ProjectKind, Registry, UnitId};
use crate::resolver::{BuildOrder, BuildUnit};
use crate::util::fs::{copy_dir_all, copy_file, list_files, remove_dir_all_if_exists};
use crate::util::hash::sha256_file;

/// What a project build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub unit: UnitId,
    pub output_dir: PathBuf,
    /// Produced files, relative to `output_dir`.
    pub files: Vec<PathBuf>,
}

/// Everything a kind-specific build step may look at.
pub struct ProjectInputs<'a> {
    pub project: &'a Project,
    pub ctx: &'a BuildContext,
    pub output_dir: &'a Path,
    /// Outputs of transitive dependencies, then linked libraries.
    pub classpath: Vec<PathBuf>,
}

impl ProjectInputs<'_> {
    fn unit(&self) -> &UnitId {
        &self.project.id
    }

    /// Run a command through the toolchain, turning a non-zero exit into
    /// [`BuildError::ToolchainFailure`].
    fn run(&self, command: &[String], env: &BTreeMap<String, String>) -> Result<(), BuildError> {
        let output = self
            .ctx
            .toolchain
            .invoke(command, env, &self.project.dir)
            .with_context(|| format!("failed to run `{}` for `{}`", command.join(" "), self.unit()))?;
        if !output.success {
            return Err(BuildError::ToolchainFailure {
                unit: self.unit().clone(),
                command: command.join(" "),
                status: output.status,
                stderr: output.stderr,
            });
        }
        if !output.stdout.trim().is_empty() {
            tracing::debug!("{}: {}", self.unit(), output.stdout.trim_end());
        }
        Ok(())
    }
}

/// A project compiled from sources with a command template.
pub trait Compilable {
    /// Source files, sorted.
    fn sources(&self, project_dir: &Path) -> anyhow::Result<Vec<PathBuf>>;

    fn compile(&self, inputs: &ProjectInputs<'_>) -> Result<(), BuildError>;
}

/// A project built by an external native command.
pub trait NativeBuildable {
    fn build_env(&self, inputs: &ProjectInputs<'_>) -> BTreeMap<String, String>;

    fn build_native(&self, inputs: &ProjectInputs<'_>) -> Result<(), BuildError>;
}

/// A project whose output is an existing directory tree.
pub trait ArchivePackageable {
    fn package(&self, inputs: &ProjectInputs<'_>) -> Result<(), BuildError>;
}

impl Compilable for SourceSpec {
    fn sources(&self, project_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut sources = Vec::new();
        for dir in &self.source_dirs {
            let root = project_dir.join(dir);
            if !root.is_dir() {
                continue;
            }
            for rel in list_files(&root)? {
                let wanted = self.extensions.is_empty()
                    || rel
                        .extension()
                        .map(|ext| self.extensions.iter().any(|e| ext == e.as_str()))
                        .unwrap_or(false);
                if wanted {
                    sources.push(root.join(rel));
                }
            }
        }
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    fn compile(&self, inputs: &ProjectInputs<'_>) -> Result<(), BuildError> {
        let template = if self.compiler.is_empty() {
            &inputs.ctx.default_compiler
        } else {
            &self.compiler
        };
        if template.is_empty() {
            return Err(anyhow!(
                "`{}` declares no `compiler` and `toolchain.compiler` is not configured",
                inputs.unit()
            )
            .into());
        }

        let sources = self.sources(&inputs.project.dir)?;
        if sources.is_empty() {
            tracing::debug!("{}: no sources, nothing to compile", inputs.unit());
            return Ok(());
        }

        let classpath = std::env::join_paths(&inputs.classpath)
            .map_err(|e| anyhow!("invalid classpath for `{}`: {}", inputs.unit(), e))?;
        let command = expand_template(
            template,
            &inputs.output_dir.to_string_lossy(),
            &sources,
            &classpath.to_string_lossy(),
        );
        inputs.run(&command, &BTreeMap::new())
    }
}

/// Expand `{out}`, `{classpath}` and `{sources}` in a compiler template.
/// A lone `{sources}` argument expands to one argument per source file.
fn expand_template(template: &[String], out: &str, sources: &[PathBuf], classpath: &str) -> Vec<String> {
    let mut command = Vec::with_capacity(template.len() + sources.len());
    for arg in template {
        if arg == "{sources}" {
            command.extend(sources.iter().map(|s| s.to_string_lossy().into_owned()));
            continue;
        }
        let joined = sources
            .iter()
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        command.push(
            arg.replace("{out}", out)
                .replace("{classpath}", classpath)
                .replace("{sources}", &joined),
        );
    }
    command
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(path|lib):([^>]+)>").expect("placeholder pattern is valid"));

/// Expand `<path:UNIT>` and `<lib:name>` placeholders.
pub fn expand_placeholders(value: &str, suite: &str, ctx: &BuildContext) -> String {
    PLACEHOLDER
        .replace_all(value, |caps: &regex::Captures<'_>| match &caps[1] {
            "path" => {
                let id = UnitId::parse_ref(&caps[2], suite);
                match ctx.library(&id) {
                    Some(lib) => lib.path.to_string_lossy().into_owned(),
                    None => ctx.unit_output_dir(&id).to_string_lossy().into_owned(),
                }
            }
            _ => ctx.host_platform().lib_file_name(&caps[2]),
        })
        .into_owned()
}

impl NativeBuildable for NativeSpec {
    fn build_env(&self, inputs: &ProjectInputs<'_>) -> BTreeMap<String, String> {
        let suite = inputs.unit().suite();
        self.build_env
            .iter()
            .map(|(key, value)| (key.clone(), expand_placeholders(value, suite, inputs.ctx)))
            .collect()
    }

    fn build_native(&self, inputs: &ProjectInputs<'_>) -> Result<(), BuildError> {
        let suite = inputs.unit().suite();
        let command: Vec<String> = self
            .command
            .iter()
            .map(|arg| expand_placeholders(arg, suite, inputs.ctx))
            .collect();
        inputs.run(&command, &self.build_env(inputs))?;

        for result in &self.results {
            let produced = inputs.project.dir.join(result);
            if !produced.exists() {
                return Err(BuildError::MissingResult {
                    unit: inputs.unit().clone(),
                    path: produced,
                });
            }
            let dest = inputs.output_dir.join(result);
            if produced.is_dir() {
                copy_dir_all(&produced, &dest)?;
            } else {
                copy_file(&produced, &dest)?;
            }
        }
        Ok(())
    }
}

impl ArchivePackageable for ArchiveSpec {
    fn package(&self, inputs: &ProjectInputs<'_>) -> Result<(), BuildError> {
        let tree = inputs.project.dir.join(&self.output_dir);
        if !tree.is_dir() {
            return Err(BuildError::MissingResult {
                unit: inputs.unit().clone(),
                path: tree,
            });
        }
        let dest = match &self.prefix {
            Some(prefix) => inputs.output_dir.join(prefix),
            None => inputs.output_dir.to_path_buf(),
        };
        copy_dir_all(&tree, &dest)?;
        Ok(())
    }
}

/// Builds project units.
pub struct ProjectBuilder<'a> {
    registry: &'a Registry,
    order: &'a BuildOrder,
    ctx: &'a BuildContext,
}

impl<'a> ProjectBuilder<'a> {
    pub fn new(registry: &'a Registry, order: &'a BuildOrder, ctx: &'a BuildContext) -> Self {
        ProjectBuilder { registry, order, ctx }
    }

    fn project(&self, unit: &UnitId) -> Result<&'a Project, BuildError> {
        self.registry
            .project(unit)
            .ok_or_else(|| anyhow!("`{}` is not a project", unit).into())
    }

    /// Build one project into its output directory, replacing whatever
    /// was there.
    pub fn build(&self, unit: &BuildUnit) -> Result<BuildResult, BuildError> {
        let project = self.project(&unit.id)?;
        self.check_compliance(project)?;

        let output_dir = self.ctx.unit_output_dir(&unit.id);
        remove_dir_all_if_exists(&output_dir)?;
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create directory: {}", output_dir.display()))?;

        let inputs = ProjectInputs {
            project,
            ctx: self.ctx,
            output_dir: &output_dir,
            classpath: self.classpath(unit),
        };

        tracing::debug!("building {} ({})", unit.id, project.kind.name());
        match &project.kind {
            ProjectKind::Source(spec) => spec.compile(&inputs)?,
            ProjectKind::Native(spec) => spec.build_native(&inputs)?,
            ProjectKind::Archive(spec) => spec.package(&inputs)?,
        }

        Ok(BuildResult {
            unit: unit.id.clone(),
            files: list_files(&output_dir)?,
            output_dir,
        })
    }

    fn check_compliance(&self, project: &Project) -> Result<(), BuildError> {
        let Some(req) = &project.compliance else {
            return Ok(());
        };
        match &self.ctx.toolchain_version {
            Some(version) if req.matches(version) => Ok(()),
            Some(version) => Err(BuildError::ComplianceMismatch {
                unit: project.id.clone(),
                required: req.to_string(),
                found: version.to_string(),
            }),
            None => {
                tracing::warn!(
                    "`{}` requires toolchain {} but `toolchain.version` is not set; not checked",
                    project.id,
                    req
                );
                Ok(())
            }
        }
    }

    /// Output directories of every transitive dependency, then every
    /// library linked by the unit or those dependencies.
    pub fn classpath(&self, unit: &BuildUnit) -> Vec<PathBuf> {
        let deps = self.order.transitive_deps(&unit.id);
        let mut classpath: Vec<PathBuf> = deps.iter().map(|d| self.ctx.unit_output_dir(d)).collect();

        let mut libraries: Vec<&UnitId> = unit.libraries.iter().collect();
        for dep in &deps {
            if let Some(dep_unit) = self.order.get(dep) {
                libraries.extend(dep_unit.libraries.iter());
            }
        }
        libraries.sort();
        libraries.dedup();
        classpath.extend(
            libraries
                .into_iter()
                .filter_map(|id| self.ctx.library(id))
                .map(|lib| lib.path.clone()),
        );
        classpath
    }

    /// Hashes of the files a project build reads, keyed by path relative to
    /// the project directory.
    pub fn input_hashes(&self, unit: &UnitId) -> Result<BTreeMap<String, String>, BuildError> {
        let project = self.project(unit)?;
        let dir = &project.dir;

        let files: Vec<PathBuf> = match &project.kind {
            ProjectKind::Source(spec) => spec.sources(dir)?,
            ProjectKind::Native(spec) => {
                if !dir.is_dir() {
                    Vec::new()
                } else {
                    list_files(dir)?
                        .into_iter()
                        .filter(|rel| !spec.results.iter().any(|r| rel.starts_with(r)))
                        .map(|rel| dir.join(rel))
                        .filter(|abs| !self.ctx.is_output_path(abs))
                        .collect()
                }
            }
            ProjectKind::Archive(spec) => {
                let tree = dir.join(&spec.output_dir);
                if tree.is_dir() {
                    list_files(&tree)?.into_iter().map(|rel| tree.join(rel)).collect()
                } else {
                    Vec::new()
                }
            }
        };

        let mut hashes = BTreeMap::new();
        for file in files {
            let key = file
                .strip_prefix(dir)
                .unwrap_or(&file)
                .to_string_lossy()
                .replace('\\', "/");
            hashes.insert(key, sha256_file(&file)?);
        }
        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Suite;
    use crate::resolver::{resolve, ResolvedLibrary};
    use crate::test_support::MockToolchain;
    use semver::Version;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        registry: Registry,
        order: BuildOrder,
    }

    impl Fixture {
        fn new(doc: &str, files: &[(&str, &str)]) -> Fixture {
            let tmp = TempDir::new().unwrap();
            for (path, content) in files {
                let path = tmp.path().join(path);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }
            let descriptor = tmp.path().join("suite.toml");
            std::fs::write(&descriptor, doc).unwrap();
            let registry = Registry::from_suites(vec![Suite::load(&descriptor).unwrap()]).unwrap();
            let order = resolve(&registry, &[]).unwrap();
            Fixture { tmp, registry, order }
        }

        fn ctx(&self, toolchain: MockToolchain) -> BuildContext {
            BuildContext::new(self.tmp.path().join("build"), Arc::new(toolchain))
        }

        fn unit(&self, name: &str) -> &BuildUnit {
            self.order.get(&UnitId::new("s", name)).unwrap()
        }
    }

    #[test]
    fn test_template_expansion() {
        let template: Vec<String> = ["javac", "-d", "{out}", "-cp", "{classpath}", "{sources}"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sources = vec![PathBuf::from("/p/src/A.java"), PathBuf::from("/p/src/B.java")];
        let command = expand_template(&template, "/out", &sources, "/dep:/lib.jar");
        assert_eq!(
            command,
            vec!["javac", "-d", "/out", "-cp", "/dep:/lib.jar", "/p/src/A.java", "/p/src/B.java"]
        );
    }

    #[test]
    fn test_source_project_invokes_compiler_with_sorted_sources() {
        let fx = Fixture::new(
            r#"
[suite]
name = "s"
[projects.core]
extensions = ["java"]
compiler = ["javac", "-d", "{out}", "{sources}"]
[projects.app]
dependencies = ["core"]
extensions = [".java"]
"#,
            &[
                ("core/src/b/B.java", "class B {}"),
                ("core/src/A.java", "class A {}"),
                ("core/src/notes.txt", "skip me"),
                ("app/src/Main.java", "class Main {}"),
            ],
        );
        let toolchain = MockToolchain::new();
        let ctx = fx.ctx(toolchain.clone()).with_compiler(vec![
            "javac".to_string(),
            "-cp".to_string(),
            "{classpath}".to_string(),
            "{sources}".to_string(),
        ]);
        let builder = ProjectBuilder::new(&fx.registry, &fx.order, &ctx);

        builder.build(fx.unit("core")).unwrap();
        builder.build(fx.unit("app")).unwrap();

        let calls = toolchain.calls();
        assert_eq!(calls.len(), 2);
        let core_dir = fx.tmp.path().join("core");
        assert_eq!(
            calls[0].command,
            vec![
                "javac".to_string(),
                "-d".to_string(),
                ctx.unit_output_dir(&UnitId::new("s", "core")).to_string_lossy().into_owned(),
                core_dir.join("src/A.java").to_string_lossy().into_owned(),
                core_dir.join("src/b/B.java").to_string_lossy().into_owned(),
            ]
        );
        assert_eq!(calls[0].cwd, core_dir);

        // `app` falls back to the configured compiler and sees `core` on its classpath.
        assert_eq!(
            calls[1].command[2],
            ctx.unit_output_dir(&UnitId::new("s", "core")).to_string_lossy()
        );
    }

    #[test]
    fn test_missing_compiler_is_an_error() {
        let fx = Fixture::new(
            "[suite]\nname = \"s\"\n[projects.core]\n",
            &[("core/src/A.java", "class A {}")],
        );
        let ctx = fx.ctx(MockToolchain::new());
        let err = ProjectBuilder::new(&fx.registry, &fx.order, &ctx)
            .build(fx.unit("core"))
            .unwrap_err();
        assert!(err.to_string().contains("toolchain.compiler"));
    }

    #[test]
    fn test_toolchain_failure_carries_unit_and_stderr() {
        let fx = Fixture::new(
            "[suite]\nname = \"s\"\n[projects.core]\ncompiler = [\"cc\", \"{sources}\"]\n",
            &[("core/src/a.c", "int main")],
        );
        let ctx = fx.ctx(MockToolchain::new().failing_on("cc"));
        let err = ProjectBuilder::new(&fx.registry, &fx.order, &ctx)
            .build(fx.unit("core"))
            .unwrap_err();
        match err {
            BuildError::ToolchainFailure { unit, status, stderr, .. } => {
                assert_eq!(unit, UnitId::new("s", "core"));
                assert_eq!(status, Some(1));
                assert!(stderr.contains("cc"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_native_project_env_and_results() {
        let fx = Fixture::new(
            r#"
[suite]
name = "s"
[libraries.ZLIB]
path = "zlib.tar"
sha256 = "0000000000000000000000000000000000000000000000000000000000000000"
[projects.headers]
kind = "archive"
output_dir = "include"
[projects.cext]
kind = "native"
command = ["make", "-C", "<path:headers>"]
build_dependencies = ["headers", "ZLIB"]
results = ["out/lib.so", "out/docs"]
[projects.cext.build_env]
HEADERS = "<path:headers>"
ZLIB = "<path:ZLIB>"
LIBNAME = "<lib:trufflenfi>"
"#,
            &[("headers/include/ruby.h", "#define RUBY 1"), ("cext/Makefile", "all:")],
        );
        let cext_dir = fx.tmp.path().join("cext");
        let toolchain = MockToolchain::new().with_effect(move |_command, _env, cwd| {
            std::fs::create_dir_all(cwd.join("out/docs")).unwrap();
            std::fs::write(cwd.join("out/lib.so"), "elf").unwrap();
            std::fs::write(cwd.join("out/docs/README"), "docs").unwrap();
        });
        let zlib = ResolvedLibrary {
            id: UnitId::new("s", "ZLIB"),
            path: fx.tmp.path().join("zlib.tar"),
            sha256: "0".repeat(64),
        };
        let ctx = fx
            .ctx(toolchain.clone())
            .with_libraries([(zlib.id.clone(), zlib.clone())].into_iter().collect());
        let builder = ProjectBuilder::new(&fx.registry, &fx.order, &ctx);

        builder.build(fx.unit("headers")).unwrap();
        let result = builder.build(fx.unit("cext")).unwrap();

        let headers_out = ctx.unit_output_dir(&UnitId::new("s", "headers"));
        assert!(headers_out.join("ruby.h").is_file());

        let call = toolchain.calls().pop().unwrap();
        assert_eq!(call.cwd, cext_dir);
        assert_eq!(call.command[2], headers_out.to_string_lossy());
        assert_eq!(call.env["HEADERS"], headers_out.to_string_lossy());
        assert_eq!(call.env["ZLIB"], zlib.path.to_string_lossy());
        assert_eq!(call.env["LIBNAME"], ctx.host_platform().lib_file_name("trufflenfi"));

        assert_eq!(
            result.files,
            vec![PathBuf::from("out/docs/README"), PathBuf::from("out/lib.so")]
        );
    }

    #[test]
    fn test_native_missing_result() {
        let fx = Fixture::new(
            "[suite]\nname = \"s\"\n[projects.cext]\nkind = \"native\"\ncommand = [\"make\"]\nresults = [\"lib.so\"]\n",
            &[("cext/Makefile", "all:")],
        );
        let ctx = fx.ctx(MockToolchain::new());
        let err = ProjectBuilder::new(&fx.registry, &fx.order, &ctx)
            .build(fx.unit("cext"))
            .unwrap_err();
        match err {
            BuildError::MissingResult { unit, path } => {
                assert_eq!(unit, UnitId::new("s", "cext"));
                assert_eq!(path, fx.tmp.path().join("cext/lib.so"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_archive_project_copies_under_prefix() {
        let fx = Fixture::new(
            "[suite]\nname = \"s\"\n[projects.core]\nkind = \"archive\"\noutput_dir = \"lib/ruby\"\nprefix = \"truffleruby\"\n",
            &[("core/lib/ruby/core.rb", "puts 1"), ("core/lib/ruby/nested/x.rb", "x")],
        );
        let ctx = fx.ctx(MockToolchain::new());
        let result = ProjectBuilder::new(&fx.registry, &fx.order, &ctx)
            .build(fx.unit("core"))
            .unwrap();
        assert_eq!(
            result.files,
            vec![
                PathBuf::from("truffleruby/core.rb"),
                PathBuf::from("truffleruby/nested/x.rb")
            ]
        );
    }

    #[test]
    fn test_compliance() {
        let doc = "[suite]\nname = \"s\"\n[projects.core]\nkind = \"archive\"\noutput_dir = \"lib\"\ncompliance = \">=17\"\n";
        let fx = Fixture::new(doc, &[("core/lib/a.rb", "a")]);

        let old = fx.ctx(MockToolchain::new()).with_toolchain_version(Some(Version::new(11, 0, 2)));
        let err = ProjectBuilder::new(&fx.registry, &fx.order, &old)
            .build(fx.unit("core"))
            .unwrap_err();
        assert!(matches!(err, BuildError::ComplianceMismatch { ref found, .. } if found == "11.0.2"));

        let new = fx.ctx(MockToolchain::new()).with_toolchain_version(Some(Version::new(21, 0, 0)));
        assert!(ProjectBuilder::new(&fx.registry, &fx.order, &new)
            .build(fx.unit("core"))
            .is_ok());
    }

    #[test]
    fn test_input_hashes_ignore_native_results() {
        let fx = Fixture::new(
            "[suite]\nname = \"s\"\n[projects.cext]\nkind = \"native\"\ncommand = [\"make\"]\nresults = [\"out\"]\n",
            &[("cext/Makefile", "all:"), ("cext/out/lib.so", "elf")],
        );
        let ctx = fx.ctx(MockToolchain::new());
        let builder = ProjectBuilder::new(&fx.registry, &fx.order, &ctx);

        let hashes = builder.input_hashes(&UnitId::new("s", "cext")).unwrap();
        assert_eq!(hashes.keys().collect::<Vec<_>>(), vec!["Makefile"]);
    }
}
