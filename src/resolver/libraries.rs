//! Library acquisition and integrity checks.
//!
//! Every library referenced by the build order is obtained (local `path`
//! first, then `url` through the fetcher) and its sha256 compared with the
//! declared one. This happens before any unit starts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::{Library, Registry, UnitId};
use crate::resolver::errors::ResolveError;
use crate::resolver::graph::BuildOrder;
use crate::sources::Fetcher;
use crate::util::hash::sha256_file;

/// A library whose content has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLibrary {
    pub id: UnitId,
    pub path: PathBuf,
    pub sha256: String,
}

/// Verified libraries keyed by id.
pub type ResolvedLibraries = BTreeMap<UnitId, ResolvedLibrary>;

/// Obtain and verify every library the order references.
pub fn resolve_libraries(
    registry: &Registry,
    order: &BuildOrder,
    fetcher: &dyn Fetcher,
) -> Result<ResolvedLibraries, ResolveError> {
    let mut resolved = BTreeMap::new();
    for id in order.libraries() {
        let library = registry.library(id).ok_or_else(|| ResolveError::UnresolvedLibrary {
            library: id.clone(),
            message: "not declared by any loaded suite".to_string(),
        })?;
        let path = obtain(library, fetcher)?;
        let lib = verify(library, path)?;
        tracing::debug!("verified library {} ({})", lib.id, &lib.sha256[..12]);
        resolved.insert(id.clone(), lib);
    }
    Ok(resolved)
}

fn obtain(library: &Library, fetcher: &dyn Fetcher) -> Result<PathBuf, ResolveError> {
    let unresolved = |message: String| ResolveError::UnresolvedLibrary {
        library: library.id.clone(),
        message,
    };

    if let Some(path) = &library.path {
        if path.is_file() {
            return Ok(path.clone());
        }
        if library.url.is_none() {
            return Err(unresolved(format!("{} does not exist", path.display())));
        }
    }

    match &library.url {
        Some(url) => fetcher
            .download(url, &library.sha256)
            .map_err(|e| unresolved(format!("{:#}", e))),
        None => Err(unresolved("no `url` or `path` declared".to_string())),
    }
}

/// Compare a file's content hash with the declared one.
pub fn verify(library: &Library, path: PathBuf) -> Result<ResolvedLibrary, ResolveError> {
    let actual = sha256_file(&path).map_err(|e| ResolveError::UnresolvedLibrary {
        library: library.id.clone(),
        message: format!("{:#}", e),
    })?;

    if actual != library.sha256 {
        return Err(ResolveError::IntegrityMismatch {
            library: library.id.clone(),
            expected: library.sha256.clone(),
            actual,
        });
    }

    Ok(ResolvedLibrary {
        id: library.id.clone(),
        path,
        sha256: actual,
    })
}
