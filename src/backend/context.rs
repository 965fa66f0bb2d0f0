//! Lowering context - roots, layout, and machine configuration.

use std::path::{Path, PathBuf};

use crate::core::graph::BuildGraph;
use crate::core::machine::MachineContext;
use crate::util::config::{BackendConfig, DirConfig, Layout};
use crate::util::fs::relative_path;

/// Everything one lowering pass needs to know about its environment.
///
/// Built once per pass from the graph and the backend configuration; all
/// plan builders borrow it read-only.
#[derive(Debug, Clone)]
pub struct LoweringContext {
    /// Source tree root
    pub source_root: PathBuf,

    /// Build tree root
    pub build_root: PathBuf,

    /// Relative path from the build root back to the source root
    pub src_to_build: PathBuf,

    /// Output directory layout mode
    pub layout: Layout,

    /// Installation directory layout
    pub dirs: DirConfig,

    /// Build/host machine pair and optional exe wrapper
    pub machines: MachineContext,

    /// The active compiler's default library search directories
    pub system_lib_dirs: Vec<PathBuf>,

    /// Argv to re-invoke this backend's own binary, used to build driver
    /// command lines for serialized invocations
    pub build_command: Vec<String>,
}

impl LoweringContext {
    /// Create a context for one lowering pass.
    pub fn new(
        source_root: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
        graph: &BuildGraph,
        config: &BackendConfig,
        build_command: Vec<String>,
    ) -> Self {
        let source_root = source_root.into();
        let build_root = build_root.into();
        let src_to_build = relative_path(&build_root, &source_root);

        LoweringContext {
            source_root,
            build_root,
            src_to_build,
            layout: config.layout.mode,
            dirs: config.dirs.clone(),
            machines: graph.machines.clone(),
            system_lib_dirs: graph.system_lib_dirs.clone(),
            build_command,
        }
    }

    /// The directory all persisted plans live in.
    pub fn plan_dir(&self) -> PathBuf {
        self.build_root.join(".stevedore")
    }

    /// The directory serialized invocations are written to.
    pub fn scratch_dir(&self) -> PathBuf {
        self.plan_dir().join("scratch")
    }

    /// Turn a build-root-relative path into an absolute one.
    pub fn to_absolute(&self, rel: &Path) -> PathBuf {
        if rel.as_os_str().is_empty() {
            self.build_root.clone()
        } else {
            self.build_root.join(rel)
        }
    }
}
