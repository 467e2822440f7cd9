//! Target platforms for platform-dependent distributions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A target platform, written `<os>-<arch>` (e.g. `linux-x86_64`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    os: String,
    arch: String,
}

impl Platform {
    /// Create a platform from its parts.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Platform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process runs on.
    pub fn current() -> Self {
        Platform::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// File name of a shared library called `name` on this platform.
    pub fn lib_file_name(&self, name: &str) -> String {
        match self.os.as_str() {
            "windows" => format!("{}.dll", name),
            "macos" | "darwin" | "ios" => format!("lib{}.dylib", name),
            _ => format!("lib{}.so", name),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() => Ok(Platform::new(os, arch)),
            _ => Err(format!(
                "invalid platform '{}'; expected '<os>-<arch>' such as 'linux-x86_64'",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform() {
        let p: Platform = "darwin-aarch64".parse().unwrap();
        assert_eq!(p.os(), "darwin");
        assert_eq!(p.arch(), "aarch64");
        assert_eq!(p.to_string(), "darwin-aarch64");

        assert!("linux".parse::<Platform>().is_err());
        assert!("-x86_64".parse::<Platform>().is_err());
    }

    #[test]
    fn test_lib_file_name() {
        assert_eq!(
            Platform::new("linux", "x86_64").lib_file_name("truffleposix"),
            "libtruffleposix.so"
        );
        assert_eq!(
            Platform::new("macos", "aarch64").lib_file_name("truffleposix"),
            "libtruffleposix.dylib"
        );
        assert_eq!(
            Platform::new("windows", "x86_64").lib_file_name("truffleposix"),
            "truffleposix.dll"
        );
    }
}
