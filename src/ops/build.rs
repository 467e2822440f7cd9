//! Implementation of `suitebuild build`.

use std::sync::Arc;

use anyhow::Result;

use crate::builder::{
    BuildContext, BuildReport, EventSink, MessageFormat, ProcessToolchain, Scheduler, Toolchain,
    UnitBuilder,
};
use crate::ops::workspace::{parse_platforms, Overrides, Workspace};
use crate::resolver::{collect_licenses, resolve, resolve_libraries, UnitKind};
use crate::util::GlobalContext;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Units to build with their dependencies (empty = the root suite)
    pub targets: Vec<String>,

    /// Number of parallel jobs
    pub jobs: Option<usize>,

    /// Use cached imports and libraries only
    pub offline: bool,

    /// Target platforms as `<os>-<arch>`
    pub platforms: Vec<String>,

    pub message_format: MessageFormat,

    /// Verbose output
    pub verbose: bool,
}

/// Build the requested units.
///
/// Resolution errors are returned before anything is built. Unit failures
/// are not errors here: they are recorded in the returned report.
pub fn build(gctx: &GlobalContext, opts: &BuildOptions) -> Result<BuildReport> {
    let mut sink = EventSink::new(opts.message_format, opts.verbose);
    build_with(gctx, opts, Arc::new(ProcessToolchain::new()), &mut sink)
}

/// [`build`] with an explicit toolchain and event sink.
pub fn build_with(
    gctx: &GlobalContext,
    opts: &BuildOptions,
    toolchain: Arc<dyn Toolchain>,
    sink: &mut EventSink,
) -> Result<BuildReport> {
    let overrides = Overrides {
        offline: opts.offline,
        jobs: opts.jobs,
        platforms: opts.platforms.clone(),
    };
    let ws = Workspace::load(gctx, &overrides)?;
    let registry = ws.registry();

    let targets = ws.parse_targets(&opts.targets);
    let order = resolve(registry, &targets)?;
    let libraries = resolve_libraries(registry, &order, ws.fetcher())?;
    tracing::debug!(
        "{} units to build, {} libraries verified",
        order.len(),
        libraries.len()
    );

    for unit in order.units().iter().filter(|u| u.kind == UnitKind::Distribution) {
        if let Some(dist) = registry.distribution(&unit.id) {
            for warning in collect_licenses(registry, dist).warnings {
                sink.diagnostic(&warning);
            }
        }
    }

    let config = ws.config();
    let ctx = BuildContext::new(ws.output_root().to_path_buf(), toolchain)
        .with_platforms(parse_platforms(&config.build.platforms)?)
        .with_compiler(config.toolchain.compiler.clone())
        .with_toolchain_version(config.toolchain_version()?)
        .with_libraries(libraries);

    let jobs = ws.jobs();
    sink.build_started(order.len(), jobs);

    let runner = UnitBuilder::new(registry, &order, &ctx);
    let report = Scheduler::new(jobs).run(&order, &runner, &mut |event| sink.unit_event(&event))?;
    sink.finish(&report);

    Ok(report)
}
