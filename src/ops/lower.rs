//! One full lowering pass.
//!
//! Loads the serialized build graph and the backend configuration, builds
//! every plan in memory, and only then persists them. A pass that fails
//! partway leaves no partial manifest behind.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::backend::context::LoweringContext;
use crate::backend::install::{InstallPlan, InstallPlanBuilder};
use crate::backend::paths::PathPlanner;
use crate::backend::regen::RegenInfo;
use crate::backend::rpath::SearchPathResolver;
use crate::backend::testplan::{TestPlan, TestPlanBuilder};
use crate::core::graph::BuildGraph;
use crate::core::program::ProgramResolver;
use crate::util::config::BackendConfig;
use crate::util::fs::ensure_dir;

/// Inputs for a lowering pass.
#[derive(Debug, Clone)]
pub struct LowerOptions {
    /// Source tree root
    pub source_dir: PathBuf,

    /// Build tree root
    pub build_dir: PathBuf,

    /// Path to the serialized build graph
    pub graph_path: PathBuf,

    /// Explicit config file; defaults to `<source>/stevedore.toml`
    pub config_path: Option<PathBuf>,

    /// Argv to re-invoke this backend's own binary
    pub build_command: Vec<String>,
}

/// What a lowering pass produced.
#[derive(Debug)]
pub struct LowerResult {
    /// Where the install plan was written
    pub install_plan_path: PathBuf,

    /// Where the test plan was written
    pub test_plan_path: PathBuf,

    /// Where the benchmark plan was written
    pub benchmark_plan_path: PathBuf,

    /// Where the regen info was written
    pub regen_info_path: PathBuf,

    /// Number of files the install plan covers
    pub installed_files: usize,

    /// Number of serialized tests
    pub test_count: usize,

    /// Number of serialized benchmarks
    pub benchmark_count: usize,
}

/// Lower one build graph into persisted plans.
pub fn lower(opts: &LowerOptions, resolver: &dyn ProgramResolver) -> Result<LowerResult> {
    let graph = BuildGraph::load(&opts.graph_path)?;
    debug!("loaded graph with {} targets", graph.len());

    let config = match &opts.config_path {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::load_or_default(&opts.source_dir.join("stevedore.toml")),
    };

    let ctx = LoweringContext::new(
        &opts.source_dir,
        &opts.build_dir,
        &graph,
        &config,
        opts.build_command.clone(),
    );
    let mut planner = PathPlanner::new(&graph, &ctx);
    let mut search = SearchPathResolver::new(&graph, &ctx);

    // Compute the full set of plans before touching the filesystem
    let install_plan: InstallPlan =
        InstallPlanBuilder::new(&graph, &ctx, resolver).build(&mut planner, &mut search)?;

    let test_builder = TestPlanBuilder::new(&graph, &ctx, resolver);
    let test_plan: TestPlan = test_builder.build(&graph.tests, &mut planner, &mut search)?;
    let benchmark_plan: TestPlan =
        test_builder.build(&graph.benchmarks, &mut planner, &mut search)?;

    let regen_info = RegenInfo {
        source_dir: opts.source_dir.clone(),
        build_dir: opts.build_dir.clone(),
        depfiles: graph.regen_files.clone(),
    };

    let plan_dir = ctx.plan_dir();
    ensure_dir(&plan_dir).context("failed to create plan directory")?;

    let result = LowerResult {
        install_plan_path: plan_dir.join("install_plan.json"),
        test_plan_path: plan_dir.join("test_plan.json"),
        benchmark_plan_path: plan_dir.join("benchmark_plan.json"),
        regen_info_path: plan_dir.join("regen_info.json"),
        installed_files: install_plan.file_count(),
        test_count: test_plan.tests.len(),
        benchmark_count: benchmark_plan.tests.len(),
    };

    install_plan.save(&result.install_plan_path)?;
    test_plan.save(&result.test_plan_path)?;
    benchmark_plan.save(&result.benchmark_plan_path)?;
    regen_info.save(&result.regen_info_path)?;

    info!(
        "lowered {}: {} install entries, {} tests, {} benchmarks",
        graph.project, result.installed_files, result.test_count, result.benchmark_count
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::TargetKind;
    use crate::test_support::{build_target, empty_graph, StubProgramResolver};
    use tempfile::TempDir;

    fn graph_on_disk(tmp: &TempDir) -> PathBuf {
        let mut graph = empty_graph();
        let mut app = build_target("app", "src", TargetKind::Executable);
        app.install = Some(crate::core::target::InstallDirective {
            dirs: vec![crate::core::target::InstallDirSpec::Dir(
                "{bindir}".to_string(),
            )],
            mode: None,
            tag: None,
            optional: false,
        });
        graph.targets.push(crate::core::target::AnyTarget::Build(app));
        graph.regen_files = vec![PathBuf::from("build.def")];

        let path = tmp.path().join("graph.json");
        std::fs::write(&path, serde_json::to_string(&graph).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_lower_persists_all_plans() {
        let tmp = TempDir::new().unwrap();
        let graph_path = graph_on_disk(&tmp);
        std::fs::write(tmp.path().join("build.def"), "x").unwrap();

        let opts = LowerOptions {
            source_dir: tmp.path().to_path_buf(),
            build_dir: tmp.path().join("build"),
            graph_path,
            config_path: None,
            build_command: vec!["stevedore".to_string()],
        };

        let result = lower(&opts, &StubProgramResolver::new()).unwrap();
        assert!(result.install_plan_path.exists());
        assert!(result.test_plan_path.exists());
        assert!(result.benchmark_plan_path.exists());
        assert!(result.regen_info_path.exists());
        assert_eq!(result.installed_files, 1);
        assert_eq!(result.test_count, 0);

        let plan = InstallPlan::load(&result.install_plan_path).unwrap();
        assert_eq!(plan.targets[0].dest_template, "{bindir}/app");
    }

    #[test]
    fn test_failed_pass_persists_nothing() {
        let tmp = TempDir::new().unwrap();

        // Two data files landing on the same destination: configuration error
        let mut graph = empty_graph();
        graph.data = vec![crate::core::graph::DataInstall {
            sources: vec![
                crate::core::target::FileRef::in_source("a", "same.txt"),
                crate::core::target::FileRef::in_source("b", "same.txt"),
            ],
            install_dir: "{datadir}".to_string(),
            rename: vec![],
            mode: None,
            tag: None,
            subproject: String::new(),
        }];
        let graph_path = tmp.path().join("graph.json");
        std::fs::write(&graph_path, serde_json::to_string(&graph).unwrap()).unwrap();

        let opts = LowerOptions {
            source_dir: tmp.path().to_path_buf(),
            build_dir: tmp.path().join("build"),
            graph_path,
            config_path: None,
            build_command: vec!["stevedore".to_string()],
        };

        let err = lower(&opts, &StubProgramResolver::new()).unwrap_err();
        assert!(err.to_string().contains("duplicate install destination"));
        assert!(!tmp.path().join("build/.stevedore/install_plan.json").exists());
    }
}
