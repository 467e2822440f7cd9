//! Test fixtures for suite directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::DESCRIPTOR_NAME;

/// A suite directory: a `suite.toml` plus any files the projects need.
#[derive(Debug, Clone)]
pub struct SuiteFixture {
    /// Suite name, used by the default descriptor.
    pub name: String,
    /// suite.toml content.
    pub descriptor: String,
    /// Extra files (path relative to the suite root -> content).
    pub files: BTreeMap<PathBuf, String>,
}

impl SuiteFixture {
    /// A suite with no imports and no units.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        SuiteFixture {
            descriptor: format!("[suite]\nname = \"{}\"\n", name),
            name,
            files: BTreeMap::new(),
        }
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Write the suite into `dir` (created if needed) and return `dir`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(DESCRIPTOR_NAME), &self.descriptor)?;
        for (path, content) in &self.files {
            let full = dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
        }
        Ok(dir.to_path_buf())
    }
}

/// Common descriptor snippets.
pub mod descriptors {
    /// A suite with one archive project `NAME` packaging `NAME/lib`.
    pub fn archive_project(suite: &str, name: &str) -> String {
        format!(
            "[suite]\nname = \"{suite}\"\n\n[projects.{name}]\nkind = \"archive\"\noutput_dir = \"lib\"\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Suite;
    use tempfile::TempDir;

    #[test]
    fn test_fixture_loads_as_suite() {
        let tmp = TempDir::new().unwrap();
        let root = SuiteFixture::new("ruby")
            .with_descriptor(descriptors::archive_project("ruby", "core"))
            .with_file("core/lib/core.rb", "puts 1")
            .write_to(&tmp.path().join("ruby"))
            .unwrap();

        let suite = Suite::load(&root.join(DESCRIPTOR_NAME)).unwrap();
        assert_eq!(suite.name, "ruby");
        assert_eq!(suite.projects.len(), 1);
        assert!(root.join("core/lib/core.rb").is_file());
    }
}
