//! Runtime library search path computation.
//!
//! POSIX binaries get an RPATH set; Windows has no RPATH, so the same
//! transitive link walk instead yields extra `PATH`/`WINEPATH` entries
//! covering every directory that could hold a required DLL.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use crate::backend::context::LoweringContext;
use crate::backend::paths::PathPlanner;
use crate::core::graph::{BuildGraph, TargetId};
use crate::core::target::{AnyTarget, BuildTarget, TargetKind};
use crate::util::diagnostic::{InvalidJustSymbolsError, UnlinkableTargetError};

/// Computes run-time library search paths for targets and ad-hoc link
/// argument lists.
///
/// Per-target results are cached for the lifetime of one lowering pass,
/// since many targets share link dependencies.
pub struct SearchPathResolver<'g> {
    graph: &'g BuildGraph,
    system_lib_dirs: BTreeSet<PathBuf>,
    rpath_cache: HashMap<TargetId, BTreeSet<PathBuf>>,
}

impl<'g> SearchPathResolver<'g> {
    /// Create a resolver for one lowering pass.
    pub fn new(graph: &'g BuildGraph, ctx: &LoweringContext) -> Self {
        SearchPathResolver {
            graph,
            system_lib_dirs: ctx.system_lib_dirs.iter().cloned().collect(),
            rpath_cache: HashMap::new(),
        }
    }

    /// The RPATH entries a target needs to locate its shared-library
    /// dependencies at run time.
    ///
    /// The result is the deduplicated union of directories named by explicit
    /// `-Wl,-rpath`/`-Wl,-R` flags and directories auto-detected from
    /// absolute library paths in the link arguments, over the target's whole
    /// transitive link closure. System library directories are excluded.
    pub fn rpaths_for_target(&mut self, id: TargetId) -> Result<BTreeSet<PathBuf>> {
        if let Some(cached) = self.rpath_cache.get(&id) {
            return Ok(cached.clone());
        }

        let graph = self.graph;
        let mut dirs = BTreeSet::new();
        if let Some(target) = graph.build_target(id) {
            for dep in &target.external_deps {
                dirs.extend(self.rpaths_from_link_args(&dep.link_args, true)?);
            }
            for dep_id in self.linkable_deps(target)? {
                dirs.extend(self.rpaths_for_target(dep_id)?);
            }
        }

        self.rpath_cache.insert(id, dirs.clone());
        Ok(dirs)
    }

    /// Extract run-time search directories from one raw link argument list.
    ///
    /// Arguments that cannot be classified contribute nothing: an incomplete
    /// search path is recoverable at run time, aborting the pass is not.
    pub fn rpaths_from_link_args(
        &self,
        link_args: &[String],
        exclude_system: bool,
    ) -> Result<BTreeSet<PathBuf>> {
        let mut dirs = BTreeSet::new();

        for arg in link_args {
            if let Some(paths) = strip_rpath_flag(arg) {
                for path in paths.split(':').filter(|p| !p.is_empty()) {
                    dirs.insert(PathBuf::from(path));
                }
            } else if let Some(paths) = strip_just_symbols_flag(arg) {
                for path in paths.split(':').filter(|p| !p.is_empty()) {
                    let lib = PathBuf::from(path);
                    let parent = lib.parent().unwrap_or_else(|| Path::new(""));
                    if !parent.is_dir() {
                        return Err(InvalidJustSymbolsError { path: lib }.into());
                    }
                    dirs.insert(parent.to_path_buf());
                }
            } else if let Some(dir) = library_dir(arg) {
                dirs.insert(dir);
            } else {
                debug!("link arg `{}` contributes no search path", arg);
            }
        }

        if exclude_system {
            dirs.retain(|d| !self.system_lib_dirs.contains(d));
        }
        Ok(dirs)
    }

    /// Extra `PATH`/`WINEPATH` directories a Windows-hosted invocation needs
    /// to find the DLLs of its transitive link dependencies.
    ///
    /// Covers the output directory of every shared-library link target, the
    /// directories detected from external link arguments, and the cross
    /// toolchain's own library directories when an emulator is involved.
    pub fn windows_extra_paths(
        &mut self,
        id: TargetId,
        planner: &mut PathPlanner<'g>,
        ctx: &LoweringContext,
    ) -> Result<Vec<PathBuf>> {
        let mut dirs = BTreeSet::new();
        let mut visited = HashSet::new();
        self.collect_windows_paths(id, planner, ctx, &mut dirs, &mut visited)?;

        if ctx.machines.is_cross() {
            dirs.extend(ctx.system_lib_dirs.iter().cloned());
        }
        Ok(dirs.into_iter().collect())
    }

    fn collect_windows_paths(
        &mut self,
        id: TargetId,
        planner: &mut PathPlanner<'g>,
        ctx: &LoweringContext,
        dirs: &mut BTreeSet<PathBuf>,
        visited: &mut HashSet<TargetId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        let graph = self.graph;
        let Some(target) = graph.build_target(id) else {
            return Ok(());
        };

        for dep in &target.external_deps {
            dirs.extend(self.rpaths_from_link_args(&dep.link_args, true)?);
        }
        for dep_id in self.linkable_deps(target)? {
            if let Some(dep) = graph.build_target(dep_id) {
                if dep.kind == TargetKind::SharedLib {
                    dirs.insert(ctx.to_absolute(&planner.target_dir(dep_id)));
                }
            }
            self.collect_windows_paths(dep_id, planner, ctx, dirs, visited)?;
        }
        Ok(())
    }

    /// A target's direct link dependencies, each validated to be linkable.
    fn linkable_deps(&self, target: &BuildTarget) -> Result<Vec<TargetId>> {
        let deps: Vec<TargetId> = target
            .link_targets
            .iter()
            .chain(&target.link_whole_targets)
            .copied()
            .collect();

        for &dep_id in &deps {
            match self.graph.target(dep_id) {
                AnyTarget::Build(t) if t.kind.is_linkable() => {}
                other => {
                    return Err(UnlinkableTargetError {
                        target: other.id(),
                    }
                    .into())
                }
            }
        }
        Ok(deps)
    }
}

/// The payload of an explicit rpath linker flag, if `arg` is one.
fn strip_rpath_flag(arg: &str) -> Option<&str> {
    arg.strip_prefix("-Wl,-rpath=")
        .or_else(|| arg.strip_prefix("-Wl,-rpath,"))
        .or_else(|| arg.strip_prefix("-Wl,-R,"))
}

/// The payload of a `--just-symbols` linker flag, if `arg` is one.
fn strip_just_symbols_flag(arg: &str) -> Option<&str> {
    arg.strip_prefix("-Wl,--just-symbols=")
        .or_else(|| arg.strip_prefix("-Wl,--just-symbols,"))
}

/// The containing directory of an absolute library-file argument.
fn library_dir(arg: &str) -> Option<PathBuf> {
    let path = Path::new(arg);
    if !path.is_absolute() {
        return None;
    }
    let name = path.file_name()?.to_string_lossy();
    let is_lib = name.ends_with(".so")
        || name.contains(".so.")
        || name.ends_with(".dylib")
        || name.ends_with(".dll")
        || name.ends_with(".lib");
    if is_lib {
        path.parent().map(Path::to_path_buf)
    } else {
        None
    }
}
