//! Target types for the resolved build graph.
//!
//! Targets arrive fully resolved from the upstream graph builder; the
//! backend reads them and never mutates them. Identity is positional: a
//! target's [`TargetId`](crate::core::graph::TargetId) is its index in the
//! graph's declaration order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::dependency::ExternalDependency;
use crate::core::graph::TargetId;
use crate::core::machine::MachineChoice;

/// The linkage kind of a build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Executable binary
    #[serde(alias = "exe")]
    Executable,

    /// Shared/dynamic library (.so / .dylib / .dll)
    #[serde(alias = "dylib", alias = "dynamic")]
    SharedLib,

    /// Static library (.a / .lib)
    #[serde(alias = "static")]
    StaticLib,

    /// Alias target that only runs a command, produces no artifact
    Run,
}

impl TargetKind {
    /// Check if this kind produces a linkable artifact.
    pub fn is_linkable(&self) -> bool {
        matches!(self, TargetKind::SharedLib | TargetKind::StaticLib)
    }
}

/// A file reference, either from the source tree or generated into the
/// build tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// True if the file lives in the build tree (generated)
    #[serde(default)]
    pub generated: bool,

    /// Directory relative to the owning tree's root
    #[serde(default)]
    pub subdir: PathBuf,

    /// File name within the subdirectory
    pub name: String,
}

impl FileRef {
    /// Reference a file in the source tree.
    pub fn in_source(subdir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        FileRef {
            generated: false,
            subdir: subdir.into(),
            name: name.into(),
        }
    }

    /// Reference a generated file in the build tree.
    pub fn in_build(subdir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        FileRef {
            generated: true,
            subdir: subdir.into(),
            name: name.into(),
        }
    }

    /// Path relative to the build root.
    ///
    /// Source-tree files are reached through `src_to_build`, the relative
    /// path from the build root back to the source root.
    pub fn rel_to_build(&self, src_to_build: &Path) -> PathBuf {
        if self.generated {
            self.subdir.join(&self.name)
        } else {
            src_to_build.join(&self.subdir).join(&self.name)
        }
    }

    /// Absolute path given both tree roots.
    pub fn absolute(&self, source_root: &Path, build_root: &Path) -> PathBuf {
        let root = if self.generated { build_root } else { source_root };
        root.join(&self.subdir).join(&self.name)
    }
}

/// One token of a custom command line.
///
/// The set of token kinds is closed; evaluation dispatches exhaustively, so
/// a new kind cannot be added without the compiler pointing at every match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandToken {
    /// Literal string, subject to placeholder substitution
    Str { value: String },

    /// A file in the source or build tree
    File { file: FileRef },

    /// A target; resolves to its primary output path
    Target { target: TargetId },

    /// A specific output of a multi-output target
    TargetOutput { target: TargetId, output: usize },
}

impl CommandToken {
    /// Shorthand for a literal token.
    pub fn str(value: impl Into<String>) -> Self {
        CommandToken::Str {
            value: value.into(),
        }
    }
}

/// Semantic category of an installed file, used for partial installs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstallTag {
    Runtime,
    Devel,
    I18n,
    Man,
    Other(String),
}

impl From<String> for InstallTag {
    fn from(s: String) -> Self {
        match s.as_str() {
            "runtime" => InstallTag::Runtime,
            "devel" => InstallTag::Devel,
            "i18n" => InstallTag::I18n,
            "man" => InstallTag::Man,
            _ => InstallTag::Other(s),
        }
    }
}

impl From<InstallTag> for String {
    fn from(tag: InstallTag) -> String {
        tag.to_string()
    }
}

impl std::fmt::Display for InstallTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallTag::Runtime => write!(f, "runtime"),
            InstallTag::Devel => write!(f, "devel"),
            InstallTag::I18n => write!(f, "i18n"),
            InstallTag::Man => write!(f, "man"),
            InstallTag::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Install directory for one target output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstallDirSpec {
    /// Destination directory template (may contain `{prefix}`, `{libdir}`, ...)
    Dir(String),

    /// `false` in the graph file: do not install this output
    Skip(bool),
}

impl InstallDirSpec {
    /// The destination template, or None for a skipped output.
    pub fn as_dir(&self) -> Option<&str> {
        match self {
            InstallDirSpec::Dir(d) => Some(d),
            InstallDirSpec::Skip(_) => None,
        }
    }
}

/// Install instructions attached to a target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallDirective {
    /// One directory shared by all outputs, or one per output
    pub dirs: Vec<InstallDirSpec>,

    /// File mode for the installed copies
    #[serde(default)]
    pub mode: Option<u32>,

    /// Explicit install tag; guessed from the destination when absent
    #[serde(default)]
    pub tag: Option<InstallTag>,

    /// Missing source is tolerated by the installer
    #[serde(default)]
    pub optional: bool,
}

/// A compiled-and-linked build target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTarget {
    /// Target name
    pub name: String,

    /// Declaring subdirectory, relative to the source root
    #[serde(default)]
    pub subdir: PathBuf,

    /// Which machine the artifact targets
    #[serde(default)]
    pub machine: MachineChoice,

    /// Linkage kind
    pub kind: TargetKind,

    /// Declared output file names; the first is the primary artifact
    pub outputs: Vec<String>,

    /// Targets linked normally
    #[serde(default)]
    pub link_targets: Vec<TargetId>,

    /// Targets linked whole-archive
    #[serde(default)]
    pub link_whole_targets: Vec<TargetId>,

    /// External dependencies with raw linker arguments
    #[serde(default)]
    pub external_deps: Vec<ExternalDependency>,

    /// Install instructions, if installable
    #[serde(default)]
    pub install: Option<InstallDirective>,

    /// Strip the artifact on install
    #[serde(default)]
    pub strip: bool,
}

impl BuildTarget {
    /// Stable textual id ("subdir/name", or plain name at the root).
    pub fn id(&self) -> String {
        if self.subdir.as_os_str().is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.subdir.display(), self.name)
        }
    }

    /// Primary output file name.
    pub fn primary_output(&self) -> &str {
        &self.outputs[0]
    }
}

/// A build step with a user-declared command line and outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTarget {
    /// Target name
    pub name: String,

    /// Declaring subdirectory, relative to the source root
    #[serde(default)]
    pub subdir: PathBuf,

    /// Command tokens, resolved by the evaluator
    pub command: Vec<CommandToken>,

    /// Input files
    #[serde(default)]
    pub inputs: Vec<FileRef>,

    /// Declared output file names
    pub outputs: Vec<String>,

    /// Dependency file name, referenced via `@DEPFILE@`
    #[serde(default)]
    pub depfile: Option<String>,

    /// Install instructions, if installable
    #[serde(default)]
    pub install: Option<InstallDirective>,
}

impl CustomTarget {
    /// Stable textual id ("subdir/name", or plain name at the root).
    pub fn id(&self) -> String {
        if self.subdir.as_os_str().is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.subdir.display(), self.name)
        }
    }
}

/// Any target stored in the graph arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnyTarget {
    Build(BuildTarget),
    Custom(CustomTarget),
}

impl AnyTarget {
    /// Target name.
    pub fn name(&self) -> &str {
        match self {
            AnyTarget::Build(t) => &t.name,
            AnyTarget::Custom(t) => &t.name,
        }
    }

    /// Declaring subdirectory.
    pub fn subdir(&self) -> &Path {
        match self {
            AnyTarget::Build(t) => &t.subdir,
            AnyTarget::Custom(t) => &t.subdir,
        }
    }

    /// Declared output file names.
    pub fn outputs(&self) -> &[String] {
        match self {
            AnyTarget::Build(t) => &t.outputs,
            AnyTarget::Custom(t) => &t.outputs,
        }
    }

    /// Install instructions, if any.
    pub fn install(&self) -> Option<&InstallDirective> {
        match self {
            AnyTarget::Build(t) => t.install.as_ref(),
            AnyTarget::Custom(t) => t.install.as_ref(),
        }
    }

    /// Stable textual id.
    pub fn id(&self) -> String {
        match self {
            AnyTarget::Build(t) => t.id(),
            AnyTarget::Custom(t) => t.id(),
        }
    }
}
