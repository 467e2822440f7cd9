//! Fetched-suite cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

type Slot = Arc<Mutex<Option<PathBuf>>>;

/// Deduplicates suite fetches by `(name, version)`.
///
/// Each key is initialized at most once; concurrent callers for the same key
/// wait on the first one. A failed initialization leaves the slot empty so a
/// later caller (for example with another URL) can try again.
#[derive(Default)]
pub struct SuiteCache {
    slots: Mutex<HashMap<(String, String), Slot>>,
}

impl SuiteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached checkout for `(name, version)`, running `init` to
    /// produce it on first use.
    pub fn get_or_try_init<F>(&self, name: &str, version: &str, init: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots
                .entry((name.to_string(), version.to_string()))
                .or_default()
                .clone()
        };

        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(path) = guard.as_ref() {
            tracing::debug!("suite {} {} already fetched", name, version);
            return Ok(path.clone());
        }

        let path = init()?;
        *guard = Some(path.clone());
        Ok(path)
    }
}
