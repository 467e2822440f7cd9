//! `suite.toml` schema.
//!
//! These are the raw, deserialized records. [`crate::core::suite::Suite`]
//! validates them into immutable value types; nothing outside the loader
//! looks at this module's types.
//!
//! ```toml
//! [suite]
//! name = "truffleruby"
//!
//! [[imports]]
//! name = "sulong"
//! version = "874220bf87fd564c28b0ad44710a6276124f5840"
//! subdir = true
//! urls = [{ url = "https://github.com/oracle/graal.git", kind = "git" }]
//!
//! [licenses."EPL-1.0"]
//! name = "Eclipse Public License 1.0"
//!
//! [projects."org.truffleruby.core"]
//! kind = "archive"
//! output_dir = "src/main/ruby"
//! prefix = "truffleruby"
//! license = ["EPL-1.0"]
//!
//! [distributions.TRUFFLERUBY]
//! dependencies = ["org.truffleruby.core"]
//! license = ["EPL-1.0"]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sources::FetchKind;

/// File name of a suite descriptor.
pub const DESCRIPTOR_NAME: &str = "suite.toml";

/// A whole `suite.toml` document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDescriptor {
    pub suite: RawSuiteHeader,

    #[serde(default)]
    pub imports: Vec<RawImport>,

    #[serde(default)]
    pub licenses: BTreeMap<String, RawLicense>,

    #[serde(default)]
    pub libraries: BTreeMap<String, RawLibrary>,

    #[serde(default)]
    pub projects: BTreeMap<String, RawProject>,

    #[serde(default)]
    pub distributions: BTreeMap<String, RawDistribution>,
}

/// The `[suite]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSuiteHeader {
    pub name: String,
    pub version: Option<String>,
}

/// One `[[imports]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawImport {
    pub name: String,
    pub version: String,

    /// The suite lives in a directory named after it inside the checkout.
    #[serde(default)]
    pub subdir: bool,

    #[serde(default)]
    pub urls: Vec<RawImportUrl>,

    /// Local checkout, relative to the importing suite.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawImportUrl {
    pub url: String,
    pub kind: FetchKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLicense {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLibrary {
    pub maven: Option<RawMaven>,
    pub url: Option<String>,
    pub path: Option<PathBuf>,
    pub sha256: String,
    pub source_sha256: Option<String>,
    #[serde(default)]
    pub license: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawMaven {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

/// A `[projects.<id>]` table; which fields apply depends on `kind`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProject {
    pub kind: Option<String>,
    pub dir: Option<PathBuf>,
    pub dependencies: Vec<String>,
    pub compliance: Option<String>,
    pub license: Vec<String>,

    // source
    pub source_dirs: Vec<String>,
    pub extensions: Vec<String>,
    pub compiler: Vec<String>,

    // native
    pub command: Vec<String>,
    pub build_env: BTreeMap<String, String>,
    pub build_dependencies: Vec<String>,
    pub results: Vec<String>,

    // archive
    pub output_dir: Option<PathBuf>,
    pub prefix: Option<String>,
}

/// A `[distributions.<id>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDistribution {
    pub dependencies: Vec<String>,
    pub dist_dependencies: Vec<String>,
    pub native: bool,
    pub platform_dependent: bool,
    pub layout: BTreeMap<String, RawLayoutValue>,
    pub license: Vec<String>,
    pub description: Option<String>,
    pub exclude: Vec<String>,
}

/// A layout destination maps to one entry or a list of entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawLayoutValue {
    One(RawLayoutEntry),
    Many(Vec<RawLayoutEntry>),
}

impl RawLayoutValue {
    pub fn into_entries(self) -> Vec<RawLayoutEntry> {
        match self {
            RawLayoutValue::One(entry) => vec![entry],
            RawLayoutValue::Many(entries) => entries,
        }
    }
}

/// `"file:path"` shorthand or the detailed table form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawLayoutEntry {
    Spec(String),
    Detailed {
        source_type: String,
        path: String,
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(default)]
        overwrite: bool,
    },
}
