//! Distribution layouts.
//!
//! A layout maps destination paths inside a distribution archive to the
//! content that fills them. Destinations ending in `/` are directories and
//! receive each source under its base name; any other destination names a
//! single file.
//!
//! Source syntax:
//! - `file:<path or glob>` relative to the declaring suite's directory
//! - `dependency:<unit>/<glob>` over a built project's output
//! - `extracted-dependency:<unit>/<glob>` over another distribution's archive

use std::fmt;

use serde::Serialize;

use crate::core::descriptor::RawLayoutEntry;
use crate::core::unit_id::UnitId;
use crate::util::fs::is_glob;

/// Assembly phase of a layout entry; entries are applied phase by phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LayoutPhase {
    /// A single literal file or directory.
    Literal,
    /// A glob over the suite directory or over a built unit's output.
    Glob,
    /// Entries pulled out of another distribution's archive.
    Extracted,
}

/// Where a layout entry takes its content from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source_type", rename_all = "kebab-case")]
pub enum LayoutSource {
    File { path: String },
    Dependency { unit: UnitId, pattern: String },
    ExtractedDependency { unit: UnitId, pattern: String },
}

impl LayoutSource {
    /// Parse the `kind:rest` shorthand.
    pub fn parse(spec: &str, default_suite: &str) -> Result<Self, String> {
        let (kind, rest) = spec
            .split_once(':')
            .ok_or_else(|| format!("layout source `{}` has no source type", spec))?;
        Self::from_parts(kind, rest, default_suite)
    }

    fn from_parts(kind: &str, rest: &str, default_suite: &str) -> Result<Self, String> {
        if rest.is_empty() {
            return Err(format!("layout source `{}:` has an empty path", kind));
        }
        match kind {
            "file" => Ok(LayoutSource::File {
                path: rest.to_string(),
            }),
            "dependency" | "extracted-dependency" => {
                let (unit, pattern) = match rest.split_once('/') {
                    Some((unit, pattern)) => (unit, pattern),
                    None => (rest, ""),
                };
                let unit = UnitId::parse_ref(unit, default_suite);
                let pattern = pattern.to_string();
                if kind == "dependency" {
                    Ok(LayoutSource::Dependency { unit, pattern })
                } else {
                    Ok(LayoutSource::ExtractedDependency { unit, pattern })
                }
            }
            other => Err(format!("unknown layout source type `{}`", other)),
        }
    }

    /// The phase in which this source is applied.
    pub fn phase(&self) -> LayoutPhase {
        match self {
            LayoutSource::File { path } if is_glob(path) => LayoutPhase::Glob,
            LayoutSource::File { .. } => LayoutPhase::Literal,
            LayoutSource::Dependency { .. } => LayoutPhase::Glob,
            LayoutSource::ExtractedDependency { .. } => LayoutPhase::Extracted,
        }
    }

    /// The unit this source reads from, if any.
    pub fn unit(&self) -> Option<&UnitId> {
        match self {
            LayoutSource::File { .. } => None,
            LayoutSource::Dependency { unit, .. } | LayoutSource::ExtractedDependency { unit, .. } => {
                Some(unit)
            }
        }
    }
}

impl fmt::Display for LayoutSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutSource::File { path } => write!(f, "file:{}", path),
            LayoutSource::Dependency { unit, pattern } => write!(f, "dependency:{}/{}", unit, pattern),
            LayoutSource::ExtractedDependency { unit, pattern } => {
                write!(f, "extracted-dependency:{}/{}", unit, pattern)
            }
        }
    }
}

/// One source assigned to a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutEntry {
    pub destination: String,
    pub source: LayoutSource,
    /// Paths (same syntax as the source path) to leave out.
    pub exclude: Vec<String>,
    /// This entry may replace content placed by an earlier entry.
    pub overwrite: bool,
}

impl LayoutEntry {
    /// Whether the destination denotes a directory.
    pub fn is_dir_destination(&self) -> bool {
        self.destination.ends_with('/')
    }

    /// Destination directory with the `./` root normalized to the empty path.
    pub fn destination_dir(&self) -> &str {
        let dir = self.destination.trim_end_matches('/');
        match dir {
            "." | "" => "",
            other => other.trim_start_matches("./"),
        }
    }

    /// Validate and convert one raw entry.
    pub fn from_raw(
        destination: &str,
        raw: RawLayoutEntry,
        default_suite: &str,
    ) -> Result<Self, String> {
        if destination.is_empty() {
            return Err("layout destination must not be empty".to_string());
        }
        if destination.starts_with('/') || destination.split('/').any(|c| c == "..") {
            return Err(format!(
                "layout destination `{}` must stay inside the archive",
                destination
            ));
        }

        let (source, exclude, overwrite) = match raw {
            RawLayoutEntry::Spec(spec) => (LayoutSource::parse(&spec, default_suite)?, Vec::new(), false),
            RawLayoutEntry::Detailed {
                source_type,
                path,
                exclude,
                overwrite,
            } => (
                LayoutSource::from_parts(&source_type, &path, default_suite)?,
                exclude,
                overwrite,
            ),
        };

        Ok(LayoutEntry {
            destination: destination.to_string(),
            source,
            exclude,
            overwrite,
        })
    }
}

/// A validated layout: entries sorted by destination, then declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Layout {
    entries: Vec<LayoutEntry>,
}

impl Layout {
    pub fn new(entries: Vec<LayoutEntry>) -> Self {
        Layout { entries }
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in application order: by phase, stable within a phase.
    pub fn in_phase_order(&self) -> Vec<&LayoutEntry> {
        let mut ordered: Vec<_> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.source.phase());
        ordered
    }

    /// Units referenced by `dependency:` and `extracted-dependency:` entries.
    pub fn referenced_units(&self) -> impl Iterator<Item = &UnitId> {
        self.entries.iter().filter_map(|e| e.source.unit())
    }
}
