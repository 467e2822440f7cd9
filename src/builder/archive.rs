//! Deterministic `.tar.gz` archives.
//!
//! Archives written here are byte-identical for identical staged trees:
//! entries are sorted by path, timestamps and ownership are zeroed and
//! modes are fixed to 0o644 or 0o755.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use walkdir::WalkDir;

const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;

/// A regular file read back from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive, `/`-separated.
    pub path: String,
    pub data: Vec<u8>,
    pub executable: bool,
}

/// Pack the contents of `staging` into a gzip-compressed tarball at `out`.
pub fn write_archive(staging: &Path, out: &Path) -> Result<()> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(staging).min_depth(1).follow_links(true) {
        let entry = entry.with_context(|| format!("failed to walk {}", staging.display()))?;
        let rel = archive_path(entry.path().strip_prefix(staging)?);
        entries.push((rel, entry.path().to_path_buf(), entry.file_type().is_dir()));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let file = File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for (rel, path, is_dir) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if is_dir {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(EXEC_MODE);
            header.set_size(0);
            builder
                .append_data(&mut header, &rel, std::io::empty())
                .with_context(|| format!("failed to add {} to archive", rel))?;
        } else {
            let data = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(if is_executable(&path) { EXEC_MODE } else { FILE_MODE });
            header.set_size(data.len() as u64);
            builder
                .append_data(&mut header, &rel, Cursor::new(data))
                .with_context(|| format!("failed to add {} to archive", rel))?;
        }
    }

    let encoder = builder.into_inner().context("failed to finish archive")?;
    encoder.finish().context("failed to finish compression")?;
    Ok(())
}

/// Read every regular file of an archive written by [`write_archive`].
pub fn read_archive(path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut entries = Vec::new();
    for entry in archive.entries().context("failed to read archive entries")? {
        let mut entry = entry.context("failed to read archive entry")?;
        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }
        let name = entry.path().context("invalid entry path")?;
        let name = archive_path(&name);
        let executable = entry.header().mode().map(|m| m & 0o111 != 0).unwrap_or(false);
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {} from {}", name, path.display()))?;
        entries.push(ArchiveEntry {
            path: name,
            data,
            executable,
        });
    }
    Ok(entries)
}

/// Extract a gzip-compressed tarball into `dest`.
///
/// With `strip_prefix`, a leading `prefix/` is removed from every entry and
/// the prefix directory itself is skipped.
pub fn extract_tarball(data: &[u8], dest: &Path, strip_prefix: Option<&str>) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(data)));

    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create destination directory: {}", dest.display()))?;

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = archive_path(&entry.path().context("failed to get entry path")?);

        let relative = match strip_prefix.map(|p| p.trim_end_matches('/')) {
            Some(prefix) if entry_path == prefix => continue,
            Some(prefix) => match entry_path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                Some(rest) => rest.to_string(),
                None => entry_path.clone(),
            },
            None => entry_path.clone(),
        };
        if relative.is_empty() {
            continue;
        }

        let relative = PathBuf::from(relative.trim_end_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("tarball entry escapes destination directory: {}", entry_path);
        }
        let output_path = dest.join(&relative);

        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&output_path)
                    .with_context(|| format!("failed to create directory: {}", output_path.display()))?;
            }
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = output_path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("failed to create directory: {}", parent.display()))?;
                }
                entry
                    .unpack(&output_path)
                    .with_context(|| format!("failed to extract {}", output_path.display()))?;
            }
            other => {
                tracing::debug!("skipping tarball entry {} ({:?})", entry_path, other);
            }
        }
    }

    Ok(())
}

fn archive_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stage(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let path = root.join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn test_archive_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        // Same tree, created in a different order.
        stage(&a, &[("lib/core.jar", "core"), ("bin/ruby", "#!/bin/sh"), ("README", "hi")]);
        stage(&b, &[("README", "hi"), ("bin/ruby", "#!/bin/sh"), ("lib/core.jar", "core")]);

        write_archive(&a, &tmp.path().join("a.tar.gz")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_archive(&b, &tmp.path().join("b.tar.gz")).unwrap();

        let first = std::fs::read(tmp.path().join("a.tar.gz")).unwrap();
        let second = std::fs::read(tmp.path().join("b.tar.gz")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_entries_are_sorted_and_normalized() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        stage(&staging, &[("z.txt", "z"), ("a/b.txt", "b")]);
        let out = tmp.path().join("out.tar.gz");
        write_archive(&staging, &out).unwrap();

        let file = File::open(&out).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut seen = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let header = entry.header();
            assert_eq!(header.mtime().unwrap(), 0);
            assert_eq!(header.uid().unwrap(), 0);
            assert_eq!(header.gid().unwrap(), 0);
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            seen.push(path.trim_end_matches('/').to_string());
        }
        assert_eq!(seen, vec!["a", "a/b.txt", "z.txt"]);
    }

    #[test]
    fn test_read_back_files() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        stage(&staging, &[("lib/core.jar", "core")]);
        let out = tmp.path().join("out.tar.gz");
        write_archive(&staging, &out).unwrap();

        let entries = read_archive(&out).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "lib/core.jar");
        assert_eq!(entries[0].data, b"core");
        assert!(!entries[0].executable);
    }

    #[test]
    fn test_extract_with_strip_prefix() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        stage(&staging, &[("demo-1.0/suite.toml", "[suite]"), ("demo-1.0/src/a.txt", "a")]);
        let out = tmp.path().join("demo.tar.gz");
        write_archive(&staging, &out).unwrap();

        let dest = tmp.path().join("extracted");
        extract_tarball(&std::fs::read(&out).unwrap(), &dest, Some("demo-1.0")).unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("suite.toml")).unwrap(), "[suite]");
        assert_eq!(std::fs::read_to_string(dest.join("src/a.txt")).unwrap(), "a");
        assert!(!dest.join("demo-1.0").exists());
    }

    #[test]
    fn test_extract_rejects_parent_components() {
        let mut data = Vec::new();
        {
            let mut builder = tar::Builder::new(GzEncoder::new(&mut data, Compression::default()));
            let mut header = tar::Header::new_gnu();
            header.set_size(4);
            header.set_mode(FILE_MODE);
            header.set_entry_type(tar::EntryType::Regular);
            // Bypass the builder's own path validation.
            let name = b"../evil";
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_cksum();
            builder.append(&header, Cursor::new(b"evil")).unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let tmp = TempDir::new().unwrap();
        let err = extract_tarball(&data, &tmp.path().join("dest"), None).unwrap_err();
        assert!(err.to_string().contains("escapes destination"));
        assert!(!tmp.path().join("evil").exists());
    }
}
