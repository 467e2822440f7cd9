//! Distribution assembly.
//!
//! A distribution's layout is first turned into an [`AssemblyPlan`], a map
//! from archive path to content. Planning applies entries phase by phase
//! (literal files, globs, extracted entries) and is where destination
//! conflicts are detected. The plan is then staged on disk and packed into a
//! deterministic archive, once per target platform for platform-dependent
//! distributions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use glob::{MatchOptions, Pattern};
use regex::Regex;

use crate::builder::archive::{read_archive, write_archive};
use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::core::{Distribution, LayoutEntry, LayoutSource, Platform, Registry, UnitId};
use crate::util::fs::{copy_file, glob_paths, is_glob, list_files, remove_dir_all_if_exists};
use crate::util::hash::{sha256_bytes, sha256_file};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

static LIB_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<lib:([^>]+)>").expect("lib placeholder pattern is valid"));

/// Content for one archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedSource {
    File(PathBuf),
    Bytes { data: Arc<Vec<u8>>, executable: bool },
}

impl StagedSource {
    fn content_hash(&self) -> anyhow::Result<String> {
        match self {
            StagedSource::File(path) => sha256_file(path),
            StagedSource::Bytes { data, executable } => {
                Ok(format!("{}{}", sha256_bytes(data), if *executable { "+x" } else { "" }))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub source: StagedSource,
    /// The layout source that placed this entry, for conflict reports.
    pub origin: String,
}

/// Archive contents of one distribution for one platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyPlan {
    pub entries: BTreeMap<String, StagedEntry>,
}

impl AssemblyPlan {
    /// Content hash of every entry, keyed by archive path.
    pub fn content_hashes(&self) -> anyhow::Result<BTreeMap<String, String>> {
        self.entries
            .iter()
            .map(|(dest, entry)| Ok((dest.clone(), entry.source.content_hash()?)))
            .collect()
    }

    /// Write every entry below `staging`.
    fn stage(&self, staging: &Path) -> anyhow::Result<()> {
        remove_dir_all_if_exists(staging)?;
        std::fs::create_dir_all(staging)
            .with_context(|| format!("failed to create directory: {}", staging.display()))?;

        for (dest, entry) in &self.entries {
            let target = staging.join(dest);
            match &entry.source {
                StagedSource::File(path) => copy_file(path, &target)?,
                StagedSource::Bytes { data, executable } => {
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)
                            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
                    }
                    std::fs::write(&target, data.as_slice())
                        .with_context(|| format!("failed to write {}", target.display()))?;
                    if *executable {
                        set_executable(&target)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Places entries, refusing to overwrite unless asked to.
struct PlanBuilder<'a> {
    distribution: &'a UnitId,
    plan: AssemblyPlan,
}

impl PlanBuilder<'_> {
    fn insert(&mut self, dest: String, source: StagedSource, origin: &str, overwrite: bool) -> Result<(), BuildError> {
        if let Some(existing) = self.plan.entries.get(&dest) {
            if !overwrite {
                return Err(BuildError::LayoutConflict {
                    distribution: self.distribution.clone(),
                    destination: dest,
                    first: existing.origin.clone(),
                    second: origin.to_string(),
                });
            }
            tracing::debug!("{}: `{}` replaces `{}` at {}", self.distribution, origin, existing.origin, dest);
        }
        self.plan.entries.insert(
            dest,
            StagedEntry {
                source,
                origin: origin.to_string(),
            },
        );
        Ok(())
    }
}

/// One matched source item: a file, or a directory contributing its files.
struct Matched {
    /// Base name of the matched path.
    name: String,
    /// Files carried by the item: path below the item (`None` for the item
    /// itself), path relative to the source base, and content.
    files: Vec<(Option<String>, String, StagedSource)>,
}

/// Builds distribution archives.
pub struct Assembler<'a> {
    registry: &'a Registry,
    ctx: &'a BuildContext,
}

impl<'a> Assembler<'a> {
    pub fn new(registry: &'a Registry, ctx: &'a BuildContext) -> Self {
        Assembler { registry, ctx }
    }

    /// Platforms a distribution is assembled for.
    pub fn platforms(&self, dist: &Distribution) -> Vec<Platform> {
        if dist.platform_dependent {
            self.ctx.platforms.clone()
        } else {
            vec![self.ctx.platforms[0].clone()]
        }
    }

    pub fn archive_name(dist: &Distribution, platform: &Platform) -> String {
        if dist.platform_dependent {
            format!("{}-{}-{}.tar.gz", dist.id.name(), platform.os(), platform.arch())
        } else {
            format!("{}.tar.gz", dist.id.name())
        }
    }

    pub fn archive_path(&self, dist: &Distribution, platform: &Platform) -> PathBuf {
        self.ctx
            .unit_output_dir(&dist.id)
            .join(Self::archive_name(dist, platform))
    }

    /// Assemble every archive of `dist` and return their paths.
    pub fn assemble(&self, dist: &Distribution) -> Result<Vec<PathBuf>, BuildError> {
        let output_dir = self.ctx.unit_output_dir(&dist.id);
        remove_dir_all_if_exists(&output_dir)?;

        let mut archives = Vec::new();
        for platform in self.platforms(dist) {
            let plan = self.plan(dist, &platform)?;
            let staging = self.ctx.staging_dir(&dist.id).join(platform.to_string());
            plan.stage(&staging)?;

            let archive = self.archive_path(dist, &platform);
            write_archive(&staging, &archive)?;
            remove_dir_all_if_exists(&staging)?;
            tracing::debug!("{}: wrote {} ({} entries)", dist.id, archive.display(), plan.entries.len());
            archives.push(archive);
        }
        Ok(archives)
    }

    /// Content hashes of every planned entry across all platforms.
    pub fn input_hashes(&self, dist: &Distribution) -> Result<BTreeMap<String, String>, BuildError> {
        let mut hashes = BTreeMap::new();
        for platform in self.platforms(dist) {
            let plan = self.plan(dist, &platform)?;
            for (dest, hash) in plan.content_hashes()? {
                let key = if dist.platform_dependent {
                    format!("{}/{}", platform, dest)
                } else {
                    dest
                };
                hashes.insert(key, hash);
            }
        }
        Ok(hashes)
    }

    /// Resolve the layout of `dist` for `platform`.
    pub fn plan(&self, dist: &Distribution, platform: &Platform) -> Result<AssemblyPlan, BuildError> {
        let mut builder = PlanBuilder {
            distribution: &dist.id,
            plan: AssemblyPlan::default(),
        };

        if dist.layout.is_empty() {
            for dep in &dist.dependencies {
                if self.registry.project(dep).is_none() {
                    continue;
                }
                let origin = format!("dependency:{}", dep);
                let root = self.ctx.unit_output_dir(dep);
                for rel in list_output(&root)? {
                    let source = StagedSource::File(root.join(&rel));
                    builder.insert(rel, source, &origin, false)?;
                }
            }
            return Ok(builder.plan);
        }

        for entry in dist.layout.in_phase_order() {
            let origin = entry.source.to_string();
            let exclude = compile_patterns(&entry.exclude, platform, &dist.id)?;
            for item in self.matches(dist, entry, platform)? {
                for (sub, rel, source) in item.files {
                    if excluded(&exclude, &rel) {
                        continue;
                    }
                    let dest = place(entry, platform, &item.name, sub.as_deref());
                    builder.insert(dest, source, &origin, entry.overwrite)?;
                }
            }
        }
        Ok(builder.plan)
    }

    fn matches(&self, dist: &Distribution, entry: &LayoutEntry, platform: &Platform) -> Result<Vec<Matched>, BuildError> {
        match &entry.source {
            LayoutSource::File { path } => {
                let path = substitute(path, platform);
                match_tree(&dist.id, &dist.root, &path)
            }
            LayoutSource::Dependency { unit, pattern } => {
                let pattern = substitute(pattern, platform);
                let pattern = if pattern.is_empty() { "*".to_string() } else { pattern };
                match_tree(&dist.id, &self.ctx.unit_output_dir(unit), &pattern)
            }
            LayoutSource::ExtractedDependency { unit, pattern } => {
                let pattern = substitute(pattern, platform);
                let pattern = if pattern.is_empty() { "*".to_string() } else { pattern };
                self.match_archive(dist, unit, &pattern, platform)
            }
        }
    }

    fn match_archive(&self, dist: &Distribution, unit: &UnitId, pattern: &str, platform: &Platform) -> Result<Vec<Matched>, BuildError> {
        let other = self
            .registry
            .distribution(unit)
            .ok_or_else(|| anyhow::anyhow!("`{}` is not a distribution", unit))?;
        let archive = self.archive_path(other, platform);
        if !archive.is_file() {
            return Err(BuildError::MissingResult {
                unit: dist.id.clone(),
                path: archive,
            });
        }
        let pattern = Pattern::new(pattern)
            .map_err(|e| anyhow::anyhow!("`{}`: invalid pattern `{}`: {}", dist.id, pattern, e))?;

        let mut items: BTreeMap<String, Matched> = BTreeMap::new();
        for file in read_archive(&archive)? {
            let Some((matched_path, sub)) = match_with_ancestors(&pattern, &file.path) else {
                continue;
            };
            let name = matched_path.rsplit('/').next().unwrap_or(matched_path).to_string();
            let source = StagedSource::Bytes {
                data: Arc::new(file.data),
                executable: file.executable,
            };
            items
                .entry(matched_path.to_string())
                .or_insert_with(|| Matched {
                    name,
                    files: Vec::new(),
                })
                .files
                .push((sub.map(str::to_string), file.path.clone(), source));
        }
        Ok(items.into_values().collect())
    }
}

/// Match `pattern` against a directory tree: every matching file or
/// directory becomes one item.
fn match_tree(dist: &UnitId, base: &Path, pattern: &str) -> Result<Vec<Matched>, BuildError> {
    let paths = if is_glob(pattern) {
        glob_paths(base, pattern)?
    } else {
        let path = base.join(pattern);
        if !path.exists() {
            return Err(BuildError::MissingResult {
                unit: dist.clone(),
                path,
            });
        }
        vec![path]
    };
    if paths.is_empty() {
        tracing::warn!("{}: `{}` matched nothing in {}", dist, pattern, base.display());
    }

    let mut items = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel_base = slash_path(path.strip_prefix(base).unwrap_or(&path));
        let files = if path.is_dir() {
            list_files(&path)?
                .into_iter()
                .map(|rel| {
                    let sub = slash_path(&rel);
                    let rel_to_base = join_segments(&[&rel_base, &sub]);
                    (Some(sub), rel_to_base, StagedSource::File(path.join(&rel)))
                })
                .collect()
        } else {
            vec![(None, rel_base, StagedSource::File(path.clone()))]
        };
        items.push(Matched { name, files });
    }
    Ok(items)
}

/// Find the shallowest path among `path` and its ancestors that matches.
/// Returns the matched path and the remainder below it.
fn match_with_ancestors<'p>(pattern: &Pattern, path: &'p str) -> Option<(&'p str, Option<&'p str>)> {
    let mut end = 0;
    loop {
        let next = path[end..].find('/').map(|i| end + i);
        let candidate = &path[..next.unwrap_or(path.len())];
        if pattern.matches_with(candidate, MATCH_OPTIONS) {
            return Some((candidate, next.map(|i| &path[i + 1..])));
        }
        end = next? + 1;
    }
}

/// Archive path of one file placed by `entry`.
fn place(entry: &LayoutEntry, platform: &Platform, name: &str, sub: Option<&str>) -> String {
    if entry.is_dir_destination() {
        let dir = substitute(entry.destination_dir(), platform);
        join_segments(&[&dir, name, sub.unwrap_or("")])
    } else {
        let dest = substitute(entry.destination.trim_start_matches("./"), platform);
        join_segments(&[&dest, sub.unwrap_or("")])
    }
}

/// Replace `<os>`, `<arch>` and `<lib:name>` for `platform`.
pub fn substitute(value: &str, platform: &Platform) -> String {
    let value = value.replace("<os>", platform.os()).replace("<arch>", platform.arch());
    LIB_PLACEHOLDER
        .replace_all(&value, |caps: &regex::Captures<'_>| platform.lib_file_name(&caps[1]))
        .into_owned()
}

fn compile_patterns(patterns: &[String], platform: &Platform, dist: &UnitId) -> Result<Vec<Pattern>, BuildError> {
    patterns
        .iter()
        .map(|p| {
            let p = substitute(p, platform);
            Pattern::new(&p).map_err(|e| {
                BuildError::from(anyhow::anyhow!("`{}`: invalid exclude pattern `{}`: {}", dist, p, e))
            })
        })
        .collect()
}

/// A path is excluded when it, or one of its ancestors, matches.
fn excluded(patterns: &[Pattern], rel: &str) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let mut candidate = rel;
    loop {
        if patterns.iter().any(|p| p.matches_with(candidate, MATCH_OPTIONS)) {
            return true;
        }
        match candidate.rfind('/') {
            Some(i) => candidate = &candidate[..i],
            None => return false,
        }
    }
}

fn list_output(root: &Path) -> Result<Vec<String>, BuildError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    Ok(list_files(root)?.iter().map(|p| slash_path(p)).collect())
}

fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn join_segments(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn set_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
