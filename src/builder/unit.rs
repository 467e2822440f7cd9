//! Building one unit, or skipping it when nothing changed.

use std::collections::BTreeMap;

use anyhow::Context;

use crate::builder::assembler::Assembler;
use crate::builder::context::BuildContext;
use crate::builder::errors::BuildError;
use crate::builder::fingerprint::UnitFingerprint;
use crate::builder::project::ProjectBuilder;
use crate::core::Registry;
use crate::resolver::{BuildOrder, BuildUnit, UnitKind};
use crate::util::hash::{sha256_dir, sha256_str, Fingerprint};

/// How a unit that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Built,
    /// Inputs and output were unchanged since the last build.
    Skipped,
}

/// Runs a single unit. The scheduler only talks to this trait.
pub trait UnitRunner: Sync {
    /// Build `unit`. `on_building` is called once the runner has decided
    /// the unit really needs to be built.
    fn run(&self, unit: &BuildUnit, on_building: &dyn Fn()) -> Result<UnitOutcome, BuildError>;
}

/// The real runner: fingerprints, then builds projects or assembles
/// distributions.
pub struct UnitBuilder<'a> {
    registry: &'a Registry,
    ctx: &'a BuildContext,
    projects: ProjectBuilder<'a>,
    assembler: Assembler<'a>,
}

impl<'a> UnitBuilder<'a> {
    pub fn new(registry: &'a Registry, order: &'a BuildOrder, ctx: &'a BuildContext) -> Self {
        UnitBuilder {
            registry,
            ctx,
            projects: ProjectBuilder::new(registry, order, ctx),
            assembler: Assembler::new(registry, ctx),
        }
    }

    /// Compute the current fingerprint of `unit`. The `output` field is
    /// left empty.
    pub fn fingerprint(&self, unit: &BuildUnit) -> Result<UnitFingerprint, BuildError> {
        let (declaration, inputs) = match unit.kind {
            UnitKind::Project => {
                let project = self
                    .registry
                    .project(&unit.id)
                    .ok_or_else(|| anyhow::anyhow!("`{}` is not a project", unit.id))?;
                (
                    serde_json::to_string(project).context("failed to serialize project")?,
                    self.projects.input_hashes(&unit.id)?,
                )
            }
            UnitKind::Distribution => {
                let dist = self
                    .registry
                    .distribution(&unit.id)
                    .ok_or_else(|| anyhow::anyhow!("`{}` is not a distribution", unit.id))?;
                (
                    serde_json::to_string(dist).context("failed to serialize distribution")?,
                    self.assembler.input_hashes(dist)?,
                )
            }
        };

        let mut dependencies = BTreeMap::new();
        for dep in &unit.deps {
            dependencies.insert(dep.to_string(), sha256_dir(&self.ctx.unit_output_dir(dep))?);
        }

        let libraries = unit
            .libraries
            .iter()
            .filter_map(|id| self.ctx.library(id))
            .map(|lib| (lib.id.to_string(), lib.sha256.clone()))
            .collect();

        let platforms: Vec<String> = self.ctx.platforms.iter().map(|p| p.to_string()).collect();
        let mut toolchain = Fingerprint::new();
        toolchain
            .update_opt(self.ctx.toolchain_version.as_ref().map(|v| v.to_string()).as_deref())
            .update_strs(self.ctx.default_compiler.iter().map(String::as_str))
            .update_strs(platforms.iter().map(String::as_str));

        Ok(UnitFingerprint {
            declaration: sha256_str(&declaration),
            inputs,
            dependencies,
            libraries,
            toolchain: Some(toolchain.finish_short()),
            output: String::new(),
        })
    }
}

impl UnitRunner for UnitBuilder<'_> {
    fn run(&self, unit: &BuildUnit, on_building: &dyn Fn()) -> Result<UnitOutcome, BuildError> {
        let fingerprint_path = self.ctx.fingerprint_path(&unit.id);
        let output_dir = self.ctx.unit_output_dir(&unit.id);

        let mut current = self.fingerprint(unit)?;
        let stored = UnitFingerprint::load(&fingerprint_path)?;
        if stored.is_some() && current.is_fresh(stored.as_ref(), &sha256_dir(&output_dir)?) {
            tracing::debug!("{} is up to date", unit.id);
            return Ok(UnitOutcome::Skipped);
        }

        on_building();
        if fingerprint_path.exists() {
            std::fs::remove_file(&fingerprint_path)
                .with_context(|| format!("failed to remove {}", fingerprint_path.display()))?;
        }

        match unit.kind {
            UnitKind::Project => {
                self.projects.build(unit)?;
            }
            UnitKind::Distribution => {
                let dist = self
                    .registry
                    .distribution(&unit.id)
                    .ok_or_else(|| anyhow::anyhow!("`{}` is not a distribution", unit.id))?;
                self.assembler.assemble(dist)?;
            }
        }

        current.output = sha256_dir(&output_dir)?;
        current.save(&fingerprint_path)?;
        Ok(UnitOutcome::Built)
    }
}
