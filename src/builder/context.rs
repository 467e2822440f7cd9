//! Build context: where outputs go and what builds them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;

use crate::builder::toolchain::Toolchain;
use crate::core::{Platform, UnitId};
use crate::resolver::{ResolvedLibraries, ResolvedLibrary};

/// Shared, read-only state for every unit of one build.
#[derive(Clone)]
pub struct BuildContext {
    /// Root of all build output (`build/` by default).
    pub output_root: PathBuf,

    /// Platforms distributions are assembled for. Never empty.
    pub platforms: Vec<Platform>,

    /// Toolchain implementation
    pub toolchain: Arc<dyn Toolchain>,

    /// Compiler template used by source projects that declare none.
    pub default_compiler: Vec<String>,

    /// Version checked against project `compliance` requirements.
    pub toolchain_version: Option<Version>,

    /// Verified libraries, keyed by id.
    pub libraries: ResolvedLibraries,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("output_root", &self.output_root)
            .field("platforms", &self.platforms)
            .field("default_compiler", &self.default_compiler)
            .field("toolchain_version", &self.toolchain_version)
            .field("libraries", &self.libraries.len())
            .finish_non_exhaustive()
    }
}

impl BuildContext {
    pub fn new(output_root: impl Into<PathBuf>, toolchain: Arc<dyn Toolchain>) -> Self {
        BuildContext {
            output_root: output_root.into(),
            platforms: vec![Platform::current()],
            toolchain,
            default_compiler: Vec::new(),
            toolchain_version: None,
            libraries: ResolvedLibraries::new(),
        }
    }

    /// Set the target platforms; an empty list means the host platform.
    pub fn with_platforms(mut self, platforms: Vec<Platform>) -> Self {
        if !platforms.is_empty() {
            self.platforms = platforms;
        }
        self
    }

    pub fn with_compiler(mut self, compiler: Vec<String>) -> Self {
        self.default_compiler = compiler;
        self
    }

    pub fn with_toolchain_version(mut self, version: Option<Version>) -> Self {
        self.toolchain_version = version;
        self
    }

    pub fn with_libraries(mut self, libraries: ResolvedLibraries) -> Self {
        self.libraries = libraries;
        self
    }

    /// Platform native commands run on; used for `<lib:...>` in build envs.
    pub fn host_platform(&self) -> Platform {
        Platform::current()
    }

    pub fn library(&self, id: &UnitId) -> Option<&ResolvedLibrary> {
        self.libraries.get(id)
    }

    pub fn units_dir(&self) -> PathBuf {
        self.output_root.join("units")
    }

    /// Directory holding everything a unit produced.
    pub fn unit_output_dir(&self, id: &UnitId) -> PathBuf {
        self.units_dir().join(id.suite()).join(id.name())
    }

    pub fn fingerprint_path(&self, id: &UnitId) -> PathBuf {
        self.output_root
            .join(".fingerprints")
            .join(id.suite())
            .join(format!("{}.json", id.name()))
    }

    /// Scratch directory a unit may use while assembling its output.
    pub fn staging_dir(&self, id: &UnitId) -> PathBuf {
        self.output_root.join(".staging").join(id.suite()).join(id.name())
    }

    /// Whether `path` lies inside the build output tree.
    pub fn is_output_path(&self, path: &Path) -> bool {
        path.starts_with(&self.output_root)
    }
}
