//! Test fixtures for Stevedore unit tests.
//!
//! Builders for in-memory graphs, targets, and lowering contexts so tests
//! can assemble exactly the shape they need without JSON fixtures.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::backend::context::LoweringContext;
use crate::core::dependency::ExternalDependency;
use crate::core::graph::{BuildGraph, TargetId};
use crate::core::machine::{MachineChoice, MachineContext, MachineInfo};
use crate::core::program::{ExternalProgram, ProgramResolver};
use crate::core::target::{AnyTarget, BuildTarget, CommandToken, CustomTarget, FileRef, TargetKind};
use crate::util::config::BackendConfig;

/// An empty native-linux graph.
pub fn empty_graph() -> BuildGraph {
    BuildGraph {
        project: "demo".to_string(),
        machines: MachineContext::native(MachineInfo::new("linux", "x86_64")),
        system_lib_dirs: vec![PathBuf::from("/usr/lib")],
        targets: vec![],
        headers: vec![],
        man: vec![],
        data: vec![],
        symlinks: vec![],
        emptydirs: vec![],
        subdirs: vec![],
        install_scripts: vec![],
        dep_manifest: BTreeMap::new(),
        tests: vec![],
        benchmarks: vec![],
        regen_files: vec![],
    }
}

/// A build target with the given name, subdir, and kind; one output named
/// after the target, nothing else set.
pub fn build_target(name: &str, subdir: &str, kind: TargetKind) -> BuildTarget {
    BuildTarget {
        name: name.to_string(),
        subdir: PathBuf::from(subdir),
        machine: MachineChoice::Host,
        kind,
        outputs: vec![name.to_string()],
        link_targets: vec![],
        link_whole_targets: vec![],
        external_deps: vec![],
        install: None,
        strip: false,
    }
}

/// A custom target with the given command, inputs, and outputs.
pub fn custom_target(
    name: &str,
    subdir: &str,
    command: Vec<CommandToken>,
    inputs: Vec<FileRef>,
    outputs: Vec<&str>,
) -> CustomTarget {
    CustomTarget {
        name: name.to_string(),
        subdir: PathBuf::from(subdir),
        command,
        inputs,
        outputs: outputs.into_iter().map(str::to_string).collect(),
        depfile: None,
        install: None,
    }
}

/// An external dependency with the given link args.
pub fn external_dep(name: &str, link_args: &[&str]) -> ExternalDependency {
    ExternalDependency::new(name, link_args.iter().map(|s| s.to_string()).collect())
}

/// Append a target to the graph and return its id.
pub fn push_target(graph: &mut BuildGraph, target: AnyTarget) -> TargetId {
    graph.targets.push(target);
    TargetId::new(graph.targets.len() - 1)
}

/// A default-configured context over `/work/src` and `/work/build`.
pub fn test_context(graph: &BuildGraph) -> LoweringContext {
    LoweringContext::new(
        "/work/src",
        "/work/build",
        graph,
        &BackendConfig::default(),
        vec!["stevedore".to_string()],
    )
}

/// A program resolver with a fixed name -> argv table; anything else is
/// reported not found.
#[derive(Debug, Default)]
pub struct StubProgramResolver {
    programs: BTreeMap<String, Vec<String>>,
}

impl StubProgramResolver {
    pub fn new() -> Self {
        StubProgramResolver {
            programs: BTreeMap::new(),
        }
    }

    pub fn with_program(mut self, name: &str, argv: &[&str]) -> Self {
        self.programs.insert(
            name.to_string(),
            argv.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

impl ProgramResolver for StubProgramResolver {
    fn resolve(&self, name_or_path: &str) -> ExternalProgram {
        match self.programs.get(name_or_path) {
            Some(argv) => ExternalProgram::from_command(name_or_path, argv.clone()),
            None => ExternalProgram::not_found(name_or_path),
        }
    }
}
