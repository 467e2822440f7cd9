//! Qualified identifiers for projects, distributions and libraries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an entity declared by a suite, written `suite:name`.
///
/// Ordering is lexicographic on `(suite, name)`; the resolver relies on it
/// as the deterministic tie-break between independent units.
/// Serialized as the `suite:name` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct UnitId {
    suite: String,
    name: String,
}

impl UnitId {
    /// Create an identifier from its parts.
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        UnitId {
            suite: suite.into(),
            name: name.into(),
        }
    }

    /// Parse a reference as written in a descriptor.
    ///
    /// `other:NAME` names an entity in suite `other`; a bare `NAME` resolves
    /// within `default_suite`.
    pub fn parse_ref(reference: &str, default_suite: &str) -> Self {
        match reference.split_once(':') {
            Some((suite, name)) if !suite.is_empty() => UnitId::new(suite, name),
            Some((_, name)) => UnitId::new(default_suite, name),
            None => UnitId::new(default_suite, reference),
        }
    }

    /// The declaring suite.
    pub fn suite(&self) -> &str {
        &self.suite
    }

    /// The entity name within its suite.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.suite, self.name)
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> String {
        id.to_string()
    }
}

impl TryFrom<String> for UnitId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.split_once(':') {
            Some((suite, name)) if !suite.is_empty() && !name.is_empty() => {
                Ok(UnitId::new(suite, name))
            }
            _ => Err(format!("expected `suite:name`, found `{}`", value)),
        }
    }
}
