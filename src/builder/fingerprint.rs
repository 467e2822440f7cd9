//! Unit fingerprints for incremental builds.
//!
//! A fingerprint captures every input of a unit: its declaration, the
//! content of its input files, the output hashes of its dependencies and
//! the libraries it links. A unit is up to date when the stored
//! fingerprint matches the current one and the output tree still hashes to
//! what was recorded after the last successful build.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Everything that went into building one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFingerprint {
    /// Hash of the unit's validated declaration.
    pub declaration: String,

    /// Input file hashes by path relative to the unit's directory.
    pub inputs: BTreeMap<String, String>,

    /// Output hash of each dependency at build time.
    pub dependencies: BTreeMap<String, String>,

    /// Content hash of each linked library.
    pub libraries: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,

    /// Output hash recorded after the last successful build.
    #[serde(default)]
    pub output: String,
}

impl UnitFingerprint {
    /// Load the stored fingerprint, if any.
    ///
    /// A corrupt file is treated as absent so the unit simply rebuilds.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fingerprint {}", path.display()))?;
        match serde_json::from_str(&content) {
            Ok(fp) => Ok(Some(fp)),
            Err(e) => {
                tracing::debug!("ignoring unreadable fingerprint {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write fingerprint {}", path.display()))?;
        Ok(())
    }

    /// Check whether the inputs are the same (the recorded output is not
    /// compared).
    pub fn matches(&self, other: &UnitFingerprint) -> bool {
        self.declaration == other.declaration
            && self.inputs == other.inputs
            && self.dependencies == other.dependencies
            && self.libraries == other.libraries
            && self.toolchain == other.toolchain
    }

    /// Whether a unit with this current fingerprint can be skipped given
    /// what is stored and what its output currently hashes to.
    pub fn is_fresh(&self, stored: Option<&UnitFingerprint>, current_output: &str) -> bool {
        match stored {
            Some(stored) => stored.matches(self) && !stored.output.is_empty() && stored.output == current_output,
            None => false,
        }
    }
}
