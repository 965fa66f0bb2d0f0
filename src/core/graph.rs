//! The resolved build graph consumed by one lowering pass.
//!
//! The upstream front end serializes a [`BuildGraph`] to JSON; the backend
//! loads it read-only. Targets live in a flat arena and are referenced by
//! small integer [`TargetId`]s assigned in declaration order, which is also
//! the order every plan builder walks them in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::machine::MachineContext;
use crate::core::target::{AnyTarget, BuildTarget, CommandToken, CustomTarget, FileRef, InstallTag};

/// Index of a target in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(usize);

impl TargetId {
    /// Wrap a raw arena index.
    pub fn new(index: usize) -> Self {
        TargetId(index)
    }

    /// The raw arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Headers to install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderInstall {
    /// Header files
    pub sources: Vec<FileRef>,

    /// Destination directory template; defaults to `{includedir}`
    #[serde(default)]
    pub install_dir: Option<String>,

    /// Subdirectory appended below the destination
    #[serde(default)]
    pub subdir: Option<String>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// Man pages to install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManInstall {
    /// Man page files; the section is the trailing extension digit
    pub sources: Vec<FileRef>,

    /// Destination directory template; defaults to `{mandir}/man<N>`
    #[serde(default)]
    pub install_dir: Option<String>,

    /// Locale subdirectory (`{mandir}/<locale>/man<N>`)
    #[serde(default)]
    pub locale: Option<String>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// Data files to install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataInstall {
    /// Data files
    pub sources: Vec<FileRef>,

    /// Destination directory template
    pub install_dir: String,

    /// Installed names, one per source; source file names when empty
    #[serde(default)]
    pub rename: Vec<String>,

    /// File mode for the installed copies
    #[serde(default)]
    pub mode: Option<u32>,

    /// Explicit install tag
    #[serde(default)]
    pub tag: Option<InstallTag>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// A symlink to create at install time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymlinkInstall {
    /// What the link points at
    pub target: String,

    /// Link file name
    pub name: String,

    /// Directory template the link is created in
    pub install_dir: String,

    /// Tolerate a dangling link target
    #[serde(default)]
    pub allow_missing: bool,

    /// Explicit install tag
    #[serde(default)]
    pub tag: Option<InstallTag>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// An empty directory to create at install time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyDirInstall {
    /// Directory template to create
    pub path: String,

    /// Directory mode
    #[serde(default)]
    pub mode: Option<u32>,

    /// Explicit install tag
    #[serde(default)]
    pub tag: Option<InstallTag>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// A whole source-tree directory to install recursively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdirInstall {
    /// Source directory, relative to the source root
    pub source_dir: PathBuf,

    /// Destination directory template
    pub install_dir: String,

    /// File mode for the installed copies
    #[serde(default)]
    pub mode: Option<u32>,

    /// Explicit install tag
    #[serde(default)]
    pub tag: Option<InstallTag>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// A script to run after files are installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInstall {
    /// Command tokens, resolved like a custom command
    pub command: Vec<CommandToken>,

    /// Skip when installing into a DESTDIR staging tree
    #[serde(default)]
    pub skip_if_destdir: bool,

    /// Explicit install tag
    #[serde(default)]
    pub tag: Option<InstallTag>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// How a test communicates results to the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestProtocol {
    /// Plain process exit code
    Exitcode,
    /// Test Anything Protocol on stdout
    Tap,
    /// Google Test output
    Gtest,
    /// Runner-specific protocol
    Custom,
}

impl Default for TestProtocol {
    fn default() -> Self {
        TestProtocol::Exitcode
    }
}

fn default_parallel() -> bool {
    true
}

/// A declared test (or benchmark; both use this shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Test name
    pub name: String,

    /// Owning project name
    #[serde(default)]
    pub project: String,

    /// Suites this test belongs to
    #[serde(default)]
    pub suites: Vec<String>,

    /// What to run: a target, a file, or an external program name
    pub exe: CommandToken,

    /// Arguments; targets passed here become runtime dependencies
    #[serde(default)]
    pub args: Vec<CommandToken>,

    /// Environment overlay
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// May run alongside other tests
    #[serde(default = "default_parallel")]
    pub is_parallel: bool,

    /// A failing exit is the expected outcome
    #[serde(default)]
    pub should_fail: bool,

    /// Timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Working directory override
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Result protocol
    #[serde(default)]
    pub protocol: TestProtocol,

    /// Scheduling priority; higher runs earlier
    #[serde(default)]
    pub priority: i32,

    /// Extra targets that must be built before running
    #[serde(default)]
    pub depends: Vec<TargetId>,
}

/// The complete resolved build description for one lowering pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildGraph {
    /// Root project name
    pub project: String,

    /// Build/host machine pair and optional exe wrapper
    pub machines: MachineContext,

    /// The active compiler's default library search directories
    #[serde(default)]
    pub system_lib_dirs: Vec<PathBuf>,

    /// Target arena in declaration order
    #[serde(default)]
    pub targets: Vec<AnyTarget>,

    /// Headers to install
    #[serde(default)]
    pub headers: Vec<HeaderInstall>,

    /// Man pages to install
    #[serde(default)]
    pub man: Vec<ManInstall>,

    /// Data files to install
    #[serde(default)]
    pub data: Vec<DataInstall>,

    /// Symlinks to create at install time
    #[serde(default)]
    pub symlinks: Vec<SymlinkInstall>,

    /// Empty directories to create at install time
    #[serde(default)]
    pub emptydirs: Vec<EmptyDirInstall>,

    /// Source-tree directories to install recursively
    #[serde(default)]
    pub subdirs: Vec<SubdirInstall>,

    /// Post-install scripts
    #[serde(default)]
    pub install_scripts: Vec<ScriptInstall>,

    /// Subproject name -> declared dependency versions
    #[serde(default)]
    pub dep_manifest: BTreeMap<String, BTreeMap<String, String>>,

    /// Declared tests
    #[serde(default)]
    pub tests: Vec<TestCase>,

    /// Declared benchmarks (same schema as tests)
    #[serde(default)]
    pub benchmarks: Vec<TestCase>,

    /// Files whose change triggers reconfiguration, relative to the source root
    #[serde(default)]
    pub regen_files: Vec<PathBuf>,
}

impl BuildGraph {
    /// Load a graph from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read build graph: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse build graph: {}", path.display()))
    }

    /// Look up a target by id.
    ///
    /// Ids are assigned from this graph's own arena, so an out-of-range id
    /// is a logic bug upstream, not a recoverable condition.
    pub fn target(&self, id: TargetId) -> &AnyTarget {
        &self.targets[id.index()]
    }

    /// Look up a build target by id; None for custom targets.
    pub fn build_target(&self, id: TargetId) -> Option<&BuildTarget> {
        match self.target(id) {
            AnyTarget::Build(t) => Some(t),
            AnyTarget::Custom(_) => None,
        }
    }

    /// Look up a custom target by id; None for build targets.
    pub fn custom_target(&self, id: TargetId) -> Option<&CustomTarget> {
        match self.target(id) {
            AnyTarget::Build(_) => None,
            AnyTarget::Custom(t) => Some(t),
        }
    }

    /// Iterate targets with their ids, in declaration order.
    pub fn targets_with_ids(&self) -> impl Iterator<Item = (TargetId, &AnyTarget)> {
        self.targets
            .iter()
            .enumerate()
            .map(|(i, t)| (TargetId::new(i), t))
    }

    /// Number of targets in the arena.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if the graph has no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
