//! Target directory and object/source path planning.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::backend::context::LoweringContext;
use crate::core::graph::{BuildGraph, TargetId};
use crate::core::target::{AnyTarget, FileRef, TargetKind};
use crate::util::config::Layout;

/// Resolves where a target's outputs live and how object files are named.
///
/// `target_dir` is pure given the layout mode and queried repeatedly by
/// every plan builder, so results are cached per target id. The cache lives
/// exactly as long as one lowering pass.
pub struct PathPlanner<'g> {
    graph: &'g BuildGraph,
    layout: Layout,
    is_windows_host: bool,
    dir_cache: HashMap<TargetId, PathBuf>,
}

impl<'g> PathPlanner<'g> {
    /// Create a planner for one lowering pass.
    pub fn new(graph: &'g BuildGraph, ctx: &LoweringContext) -> Self {
        PathPlanner {
            graph,
            layout: ctx.layout,
            is_windows_host: ctx.machines.host.is_windows(),
            dir_cache: HashMap::new(),
        }
    }

    /// The directory a target's outputs go into, relative to the build root.
    ///
    /// Run targets produce no artifact and use the build root itself, as
    /// does everything under the flat layout; the mirror layout keeps each
    /// target's outputs under its declaring subdirectory.
    pub fn target_dir(&mut self, id: TargetId) -> PathBuf {
        if let Some(dir) = self.dir_cache.get(&id) {
            return dir.clone();
        }

        let dir = match self.graph.target(id) {
            AnyTarget::Build(t) if t.kind == TargetKind::Run => PathBuf::new(),
            target => match self.layout {
                Layout::Mirror => target.subdir().to_path_buf(),
                Layout::Flat => PathBuf::new(),
            },
        };

        self.dir_cache.insert(id, dir.clone());
        dir
    }

    /// A target's n-th output path, relative to the build root.
    pub fn output_path(&mut self, id: TargetId, index: usize) -> PathBuf {
        let name = &self.graph.target(id).outputs()[index];
        self.target_dir(id).join(name)
    }

    /// All output paths of a target, relative to the build root.
    pub fn output_paths(&mut self, id: TargetId) -> Vec<PathBuf> {
        (0..self.graph.target(id).outputs().len())
            .map(|i| self.output_path(id, i))
            .collect()
    }

    /// A target's private scratch directory, relative to the build root.
    pub fn private_dir(&mut self, id: TargetId) -> PathBuf {
        let name = format!("{}.p", self.graph.target(id).name());
        self.target_dir(id).join(name)
    }

    /// Derive a collision-free object file name for one source of a target.
    ///
    /// The source's full tree-relative path is flattened into the name, so
    /// same-named sources in different subdirectories cannot collide, and
    /// generated inputs are prefixed so a generated file cannot collide with
    /// a source-tree file of the same path.
    pub fn object_file_name(&self, source: &FileRef) -> String {
        let rel = source.subdir.join(&source.name);
        let flat: String = rel.display().to_string().replace(['/', '\\'], "_");

        let ext = if self.is_windows_host { "obj" } else { "o" };
        if source.generated {
            format!("gen_{}.{}", flat, ext)
        } else {
            format!("{}.{}", flat, ext)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{build_target, custom_target, empty_graph};
    use crate::util::config::BackendConfig;

    fn planner_fixture(layout: Layout) -> (BuildGraph, LoweringContext) {
        let mut graph = empty_graph();
        graph.targets = vec![
            AnyTarget::Build(build_target("app", "src", TargetKind::Executable)),
            AnyTarget::Build(build_target("check", "src", TargetKind::Run)),
            AnyTarget::Custom(custom_target(
                "gen",
                "gen",
                vec![],
                vec![],
                vec!["a.out", "a.h"],
            )),
        ];

        let mut config = BackendConfig::default();
        config.layout.mode = layout;
        let ctx = LoweringContext::new("/s", "/b", &graph, &config, vec!["stevedore".to_string()]);
        (graph, ctx)
    }

    #[test]
    fn test_target_dir_mirror_layout() {
        let (graph, ctx) = planner_fixture(Layout::Mirror);
        let mut planner = PathPlanner::new(&graph, &ctx);

        assert_eq!(planner.target_dir(TargetId::new(0)), PathBuf::from("src"));
        // Run targets always resolve to the build root
        assert_eq!(planner.target_dir(TargetId::new(1)), PathBuf::new());
        assert_eq!(
            planner.output_path(TargetId::new(2), 0),
            PathBuf::from("gen/a.out")
        );
    }

    #[test]
    fn test_target_dir_flat_layout() {
        let (graph, ctx) = planner_fixture(Layout::Flat);
        let mut planner = PathPlanner::new(&graph, &ctx);

        assert_eq!(planner.target_dir(TargetId::new(0)), PathBuf::new());
        assert_eq!(
            planner.output_path(TargetId::new(2), 0),
            PathBuf::from("a.out")
        );
    }

    #[test]
    fn test_target_dir_is_cached() {
        let (graph, ctx) = planner_fixture(Layout::Mirror);
        let mut planner = PathPlanner::new(&graph, &ctx);

        let first = planner.target_dir(TargetId::new(0));
        assert!(planner.dir_cache.contains_key(&TargetId::new(0)));
        assert_eq!(planner.target_dir(TargetId::new(0)), first);
    }

    #[test]
    fn test_private_dir() {
        let (graph, ctx) = planner_fixture(Layout::Mirror);
        let mut planner = PathPlanner::new(&graph, &ctx);

        assert_eq!(
            planner.private_dir(TargetId::new(2)),
            PathBuf::from("gen/gen.p")
        );
    }

    #[test]
    fn test_object_file_name_disambiguates() {
        let (graph, ctx) = planner_fixture(Layout::Mirror);
        let planner = PathPlanner::new(&graph, &ctx);

        let a = planner.object_file_name(&FileRef::in_source("src", "main.c"));
        let b = planner.object_file_name(&FileRef::in_source("src/sub", "main.c"));
        assert_ne!(a, b);
        assert_eq!(a, "src_main.c.o");

        // Generated files get a distinguishing prefix
        let g = planner.object_file_name(&FileRef::in_build("src", "main.c"));
        assert_eq!(g, "gen_src_main.c.o");
    }
}
