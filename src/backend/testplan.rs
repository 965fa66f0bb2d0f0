//! Test plan assembly.
//!
//! Each declared test (or benchmark; same schema) becomes a self-contained
//! serialisation an external runner can execute without the build graph:
//! resolved argv, environment, wrapper, extra search paths, protocol,
//! priority, and the target ids that must be built first.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::context::LoweringContext;
use crate::backend::exec::{artifact_argv, wrapper_for};
use crate::backend::paths::PathPlanner;
use crate::backend::rpath::SearchPathResolver;
use crate::core::graph::{BuildGraph, TargetId, TestCase, TestProtocol};
use crate::core::machine::MachineChoice;
use crate::core::program::ProgramResolver;
use crate::core::target::{AnyTarget, CommandToken};
use crate::util::fs::write_atomic;

/// One test, fully described for an external runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSerialisation {
    /// Test name
    pub name: String,

    /// Owning project name
    pub project: String,

    /// Suites this test belongs to
    #[serde(default)]
    pub suites: Vec<String>,

    /// Resolved executable invocation
    pub exe: Vec<String>,

    /// Extra command arguments appended after the executable
    #[serde(default)]
    pub cmd_args: Vec<String>,

    /// True when any participant targets the host of a cross build
    #[serde(default)]
    pub is_cross_built: bool,

    /// Wrapper argv for running a foreign-architecture binary
    #[serde(default)]
    pub exe_wrapper: Option<Vec<String>>,

    /// May run alongside other tests
    #[serde(default)]
    pub is_parallel: bool,

    /// Environment overlay
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// A failing exit is the expected outcome
    #[serde(default)]
    pub should_fail: bool,

    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Working directory override
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Extra search-path entries for locating shared libraries
    #[serde(default)]
    pub extra_paths: Vec<PathBuf>,

    /// Result protocol
    #[serde(default)]
    pub protocol: TestProtocol,

    /// Scheduling priority; higher runs earlier
    #[serde(default)]
    pub priority: i32,

    /// Ids of targets that must be built before running
    #[serde(default)]
    pub depends: Vec<String>,
}

/// The ordered test plan consumed by the external runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPlan {
    /// Root project name
    pub project: String,

    /// Tests in execution order
    pub tests: Vec<TestSerialisation>,
}

impl TestPlan {
    /// Persist the plan atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Load a persisted plan.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read test plan: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse test plan: {}", path.display()))
    }
}

/// Converts test declarations into serialisations.
pub struct TestPlanBuilder<'g, 'c> {
    graph: &'g BuildGraph,
    ctx: &'c LoweringContext,
    resolver: &'c dyn ProgramResolver,
}

impl<'g, 'c> TestPlanBuilder<'g, 'c> {
    pub fn new(
        graph: &'g BuildGraph,
        ctx: &'c LoweringContext,
        resolver: &'c dyn ProgramResolver,
    ) -> Self {
        TestPlanBuilder {
            graph,
            ctx,
            resolver,
        }
    }

    /// Build a plan from the given cases (tests or benchmarks).
    ///
    /// Output order is by descending priority; ties keep declaration order.
    pub fn build(
        &self,
        cases: &[TestCase],
        planner: &mut PathPlanner<'g>,
        search: &mut SearchPathResolver<'g>,
    ) -> Result<TestPlan> {
        let mut tests = Vec::with_capacity(cases.len());
        for case in cases {
            tests.push(self.serialize_case(case, planner, search)?);
        }
        tests.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(TestPlan {
            project: self.graph.project.clone(),
            tests,
        })
    }

    fn serialize_case(
        &self,
        case: &TestCase,
        planner: &mut PathPlanner<'g>,
        search: &mut SearchPathResolver<'g>,
    ) -> Result<TestSerialisation> {
        let mut participants: Vec<TargetId> = Vec::new();

        let exe = match &case.exe {
            CommandToken::Str { value } => {
                let program = self.resolver.resolve(value);
                program.command()?.to_vec()
            }
            CommandToken::File { file } => {
                let path = file.absolute(&self.ctx.source_root, &self.ctx.build_root);
                artifact_argv(self.ctx, &path)
            }
            CommandToken::Target { target } => {
                participants.push(*target);
                let path = self.ctx.to_absolute(&planner.output_path(*target, 0));
                artifact_argv(self.ctx, &path)
            }
            CommandToken::TargetOutput { target, output } => {
                participants.push(*target);
                let path = self.ctx.to_absolute(&planner.output_path(*target, *output));
                artifact_argv(self.ctx, &path)
            }
        };

        let mut cmd_args = Vec::with_capacity(case.args.len());
        for arg in &case.args {
            let value = match arg {
                CommandToken::Str { value } => value.clone(),
                CommandToken::File { file } => file
                    .absolute(&self.ctx.source_root, &self.ctx.build_root)
                    .display()
                    .to_string(),
                CommandToken::Target { target } => {
                    participants.push(*target);
                    self.ctx
                        .to_absolute(&planner.output_path(*target, 0))
                        .display()
                        .to_string()
                }
                CommandToken::TargetOutput { target, output } => {
                    participants.push(*target);
                    self.ctx
                        .to_absolute(&planner.output_path(*target, *output))
                        .display()
                        .to_string()
                }
            };
            cmd_args.push(value);
        }

        // A test is only as native as its least-native participant
        let is_cross_built = self.ctx.machines.is_cross()
            && participants.iter().any(|&id| {
                matches!(
                    self.graph.target(id),
                    AnyTarget::Build(t) if t.machine == MachineChoice::Host
                )
            });

        let exe_wrapper = if is_cross_built {
            wrapper_for(self.ctx, MachineChoice::Host, &case.name)?
        } else {
            None
        };

        let extra_paths = if self.ctx.machines.host.is_windows() {
            let mut paths = Vec::new();
            for &id in &participants {
                for path in search.windows_extra_paths(id, planner, self.ctx)? {
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
            }
            paths
        } else {
            Vec::new()
        };

        let mut depends = Vec::new();
        for id in participants.iter().copied().chain(case.depends.iter().copied()) {
            let textual = self.graph.target(id).id();
            if !depends.contains(&textual) {
                depends.push(textual);
            }
        }

        Ok(TestSerialisation {
            name: case.name.clone(),
            project: if case.project.is_empty() {
                self.graph.project.clone()
            } else {
                case.project.clone()
            },
            suites: case.suites.clone(),
            exe,
            cmd_args,
            is_cross_built,
            exe_wrapper,
            is_parallel: case.is_parallel,
            env: case.env.clone(),
            should_fail: case.should_fail,
            timeout: case.timeout,
            workdir: case.workdir.clone(),
            extra_paths,
            protocol: case.protocol,
            priority: case.priority,
            depends,
        })
    }
}
