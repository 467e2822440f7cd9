//! Toolchain abstraction.
//!
//! Builds never hard-code a compiler: every command comes from the
//! descriptor or the config and runs through a [`Toolchain`]. Tests swap
//! in a recording implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::util::process::{find_executable, ProcessBuilder};

/// Captured result of one toolchain invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs build commands.
pub trait Toolchain: Send + Sync {
    /// Run `command` (program followed by arguments) in `cwd` with `env`
    /// layered over the inherited environment.
    fn invoke(&self, command: &[String], env: &BTreeMap<String, String>, cwd: &Path) -> Result<ToolOutput>;
}

/// Runs commands as real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct ProcessToolchain;

impl ProcessToolchain {
    pub fn new() -> Self {
        ProcessToolchain
    }

    /// Locate the program: paths are taken relative to `cwd`, bare names
    /// are looked up in PATH.
    fn program_path(program: &str, cwd: &Path) -> PathBuf {
        let as_path = Path::new(program);
        if as_path.is_absolute() {
            return as_path.to_path_buf();
        }
        if as_path.components().count() > 1 {
            return cwd.join(as_path);
        }
        find_executable(program).unwrap_or_else(|| as_path.to_path_buf())
    }
}

impl Toolchain for ProcessToolchain {
    fn invoke(&self, command: &[String], env: &BTreeMap<String, String>, cwd: &Path) -> Result<ToolOutput> {
        let Some((program, args)) = command.split_first() else {
            bail!("empty command");
        };

        let process = ProcessBuilder::new(Self::program_path(program, cwd))
            .args(args)
            .envs(env)
            .cwd(cwd);
        tracing::debug!("running `{}` in {}", process.display_command(), cwd.display());

        let output = process.exec()?;
        Ok(ToolOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_command_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = ProcessToolchain::new()
            .invoke(&[], &BTreeMap::new(), tmp.path())
            .unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }

    #[test]
    fn test_relative_program_resolves_against_cwd() {
        let cwd = Path::new("/work/project");
        assert_eq!(
            ProcessToolchain::program_path("./configure", cwd),
            PathBuf::from("/work/project/./configure")
        );
        assert_eq!(
            ProcessToolchain::program_path("/usr/bin/env", cwd),
            PathBuf::from("/usr/bin/env")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_invoke_captures_output_and_env() {
        let tmp = TempDir::new().unwrap();
        let mut env = BTreeMap::new();
        env.insert("SUITEBUILD_GREETING".to_string(), "hello".to_string());

        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo $SUITEBUILD_GREETING; pwd; echo oops >&2; exit 3".to_string(),
        ];
        let out = ProcessToolchain::new().invoke(&command, &env, tmp.path()).unwrap();

        assert!(!out.success);
        assert_eq!(out.status, Some(3));
        assert!(out.stdout.starts_with("hello\n"));
        assert_eq!(out.stderr.trim(), "oops");
    }
}
