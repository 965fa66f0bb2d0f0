//! Install plan assembly.
//!
//! One walk over the graph's installable entities, in declaration order,
//! produces the full manifest an external installer process consumes:
//! target outputs, headers, man pages, data files, whole directory trees,
//! symlinks, empty directories, and post-install scripts. The plan is built
//! completely in memory and persisted in a single atomic write.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::backend::context::LoweringContext;
use crate::backend::custom::CustomCommandEvaluator;
use crate::backend::exec::ExecutableSerialisation;
use crate::backend::paths::PathPlanner;
use crate::backend::rpath::SearchPathResolver;
use crate::core::graph::{BuildGraph, ManInstall};
use crate::core::program::ProgramResolver;
use crate::core::target::{AnyTarget, CommandToken, InstallTag, TargetKind};
use crate::util::diagnostic::{InstallCollisionError, InstallCountMismatchError};
use crate::util::fs::write_atomic;

/// One file to copy at install time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallEntry {
    /// Absolute source path in the build or source tree
    pub source: PathBuf,

    /// Resolved destination path
    pub destination: PathBuf,

    /// Destination template with `{prefix}` preserved for the installer's
    /// own DESTDIR/prefix substitution
    pub dest_template: String,

    /// File mode for the installed copy
    #[serde(default)]
    pub mode: Option<u32>,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,

    /// Semantic category for partial installs
    pub tag: InstallTag,

    /// Missing source is tolerated by the installer
    #[serde(default)]
    pub optional: bool,

    /// Strip the artifact after copying
    #[serde(default)]
    pub strip: bool,

    /// Build-tree RPATH entries the installer must drop or rewrite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rpath_dirs: Vec<PathBuf>,
}

/// A symlink to create at install time; created, not copied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymlinkEntry {
    /// What the link points at
    pub target: String,

    /// Link file name
    pub name: String,

    /// Resolved directory the link is created in
    pub destination: PathBuf,

    /// Directory template with `{prefix}` preserved
    pub dest_template: String,

    /// Tolerate a dangling link target
    #[serde(default)]
    pub allow_missing: bool,

    /// Semantic category for partial installs
    pub tag: InstallTag,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// An empty directory to create at install time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmptyDirEntry {
    /// Resolved directory path
    pub path: PathBuf,

    /// Directory template with `{prefix}` preserved
    pub dest_template: String,

    /// Directory mode
    #[serde(default)]
    pub mode: Option<u32>,

    /// Semantic category for partial installs
    pub tag: InstallTag,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// A script the installer runs after files are in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallScript {
    /// The fully resolved invocation
    pub exe: ExecutableSerialisation,

    /// Skip when installing into a DESTDIR staging tree
    #[serde(default)]
    pub skip_if_destdir: bool,

    /// Semantic category for partial installs
    pub tag: InstallTag,

    /// Owning subproject
    #[serde(default)]
    pub subproject: String,
}

/// The complete ordered install manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallPlan {
    /// Root project name
    pub project: String,

    /// Configured installation prefix
    pub prefix: PathBuf,

    /// Target outputs
    pub targets: Vec<InstallEntry>,

    /// Headers
    pub headers: Vec<InstallEntry>,

    /// Man pages
    pub man: Vec<InstallEntry>,

    /// Data files
    pub data: Vec<InstallEntry>,

    /// Files from recursively installed directories
    pub subdirs: Vec<InstallEntry>,

    /// Symlinks
    pub symlinks: Vec<SymlinkEntry>,

    /// Empty directories
    pub emptydirs: Vec<EmptyDirEntry>,

    /// Post-install scripts
    pub install_scripts: Vec<InstallScript>,

    /// Subproject name -> declared dependency versions
    pub dep_manifest: BTreeMap<String, BTreeMap<String, String>>,
}

impl InstallPlan {
    /// Persist the plan atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Load a persisted plan.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read install plan: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse install plan: {}", path.display()))
    }

    /// Total number of file-producing entries.
    pub fn file_count(&self) -> usize {
        self.targets.len() + self.headers.len() + self.man.len() + self.data.len()
            + self.subdirs.len()
    }
}

/// Assembles the install manifest from the graph's declarations.
pub struct InstallPlanBuilder<'g, 'c> {
    graph: &'g BuildGraph,
    ctx: &'c LoweringContext,
    resolver: &'c dyn ProgramResolver,
    seen: BTreeSet<(String, PathBuf)>,
}

impl<'g, 'c> InstallPlanBuilder<'g, 'c> {
    pub fn new(
        graph: &'g BuildGraph,
        ctx: &'c LoweringContext,
        resolver: &'c dyn ProgramResolver,
    ) -> Self {
        InstallPlanBuilder {
            graph,
            ctx,
            resolver,
            seen: BTreeSet::new(),
        }
    }

    /// Build the full manifest.
    ///
    /// Walks every installable entity once, in declaration order, and fails
    /// on the first configuration error; nothing is persisted here.
    pub fn build(
        &mut self,
        planner: &mut PathPlanner<'g>,
        search: &mut SearchPathResolver<'g>,
    ) -> Result<InstallPlan> {
        let mut plan = InstallPlan {
            project: self.graph.project.clone(),
            prefix: self.ctx.dirs.prefix.clone(),
            targets: Vec::new(),
            headers: Vec::new(),
            man: Vec::new(),
            data: Vec::new(),
            subdirs: Vec::new(),
            symlinks: Vec::new(),
            emptydirs: Vec::new(),
            install_scripts: Vec::new(),
            dep_manifest: self.graph.dep_manifest.clone(),
        };

        self.collect_targets(planner, search, &mut plan.targets)?;
        self.collect_headers(&mut plan.headers)?;
        self.collect_man(&mut plan.man)?;
        self.collect_data(&mut plan.data)?;
        self.collect_subdirs(&mut plan.subdirs)?;
        self.collect_symlinks(&mut plan.symlinks)?;
        self.collect_emptydirs(&mut plan.emptydirs);
        self.collect_scripts(planner, &mut plan.install_scripts)?;

        Ok(plan)
    }

    fn collect_targets(
        &mut self,
        planner: &mut PathPlanner<'g>,
        search: &mut SearchPathResolver<'g>,
        entries: &mut Vec<InstallEntry>,
    ) -> Result<()> {
        for (id, target) in self.graph.targets_with_ids() {
            let Some(install) = target.install() else {
                continue;
            };

            let outputs = target.outputs();
            if install.dirs.len() != 1 && install.dirs.len() != outputs.len() {
                return Err(InstallCountMismatchError {
                    target: target.id(),
                    outputs: outputs.len(),
                    dirs: install.dirs.len(),
                }
                .into());
            }

            let (kind, strip) = match target {
                AnyTarget::Build(t) => (Some(t.kind), t.strip),
                AnyTarget::Custom(_) => (None, false),
            };

            // The installer rewrites RPATHs that point into the build tree
            let rpath_dirs: Vec<PathBuf> = match kind {
                Some(TargetKind::Executable) | Some(TargetKind::SharedLib)
                    if !self.ctx.machines.host.is_windows() =>
                {
                    search.rpaths_for_target(id)?.into_iter().collect()
                }
                _ => Vec::new(),
            };

            for (index, output) in outputs.iter().enumerate() {
                let spec = if install.dirs.len() == 1 {
                    &install.dirs[0]
                } else {
                    &install.dirs[index]
                };
                let Some(dir_template) = spec.as_dir() else {
                    // this output is explicitly not installed
                    continue;
                };

                let dest_dir = self.ctx.dirs.resolve(dir_template);
                let destination = dest_dir.join(output);
                let tag = install
                    .tag
                    .clone()
                    .unwrap_or_else(|| self.guess_tag(&dest_dir, kind));
                self.check_collision(&tag, &destination)?;

                entries.push(InstallEntry {
                    source: self.ctx.to_absolute(&planner.output_path(id, index)),
                    destination,
                    dest_template: format!("{}/{}", dir_template, output),
                    mode: install.mode,
                    subproject: String::new(),
                    tag,
                    optional: install.optional,
                    strip,
                    rpath_dirs: rpath_dirs.clone(),
                });
            }
        }
        Ok(())
    }

    fn collect_headers(&mut self, entries: &mut Vec<InstallEntry>) -> Result<()> {
        for headers in &self.graph.headers {
            let base = headers
                .install_dir
                .clone()
                .unwrap_or_else(|| "{includedir}".to_string());
            let template = match &headers.subdir {
                Some(subdir) => format!("{}/{}", base, subdir),
                None => base,
            };
            let dest_dir = self.ctx.dirs.resolve(&template);

            for source in &headers.sources {
                let destination = dest_dir.join(&source.name);
                self.check_collision(&InstallTag::Devel, &destination)?;
                entries.push(InstallEntry {
                    source: source.absolute(&self.ctx.source_root, &self.ctx.build_root),
                    destination,
                    dest_template: format!("{}/{}", template, source.name),
                    mode: None,
                    subproject: headers.subproject.clone(),
                    tag: InstallTag::Devel,
                    optional: false,
                    strip: false,
                    rpath_dirs: Vec::new(),
                });
            }
        }
        Ok(())
    }

    fn collect_man(&mut self, entries: &mut Vec<InstallEntry>) -> Result<()> {
        for man in &self.graph.man {
            for source in &man.sources {
                let template = man
                    .install_dir
                    .clone()
                    .unwrap_or_else(|| default_man_dir(man, &source.name));
                let dest_dir = self.ctx.dirs.resolve(&template);
                let destination = dest_dir.join(&source.name);
                self.check_collision(&InstallTag::Man, &destination)?;
                entries.push(InstallEntry {
                    source: source.absolute(&self.ctx.source_root, &self.ctx.build_root),
                    destination,
                    dest_template: format!("{}/{}", template, source.name),
                    mode: None,
                    subproject: man.subproject.clone(),
                    tag: InstallTag::Man,
                    optional: false,
                    strip: false,
                    rpath_dirs: Vec::new(),
                });
            }
        }
        Ok(())
    }

    fn collect_data(&mut self, entries: &mut Vec<InstallEntry>) -> Result<()> {
        for data in &self.graph.data {
            let dest_dir = self.ctx.dirs.resolve(&data.install_dir);
            for (index, source) in data.sources.iter().enumerate() {
                let name = data
                    .rename
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| source.name.clone());
                let destination = dest_dir.join(&name);
                let tag = data
                    .tag
                    .clone()
                    .unwrap_or_else(|| self.guess_tag(&dest_dir, None));
                self.check_collision(&tag, &destination)?;
                entries.push(InstallEntry {
                    source: source.absolute(&self.ctx.source_root, &self.ctx.build_root),
                    destination,
                    dest_template: format!("{}/{}", data.install_dir, name),
                    mode: data.mode,
                    subproject: data.subproject.clone(),
                    tag,
                    optional: false,
                    strip: false,
                    rpath_dirs: Vec::new(),
                });
            }
        }
        Ok(())
    }

    fn collect_subdirs(&mut self, entries: &mut Vec<InstallEntry>) -> Result<()> {
        for subdir in &self.graph.subdirs {
            let base = self.ctx.source_root.join(&subdir.source_dir);
            let dest_dir = self.ctx.dirs.resolve(&subdir.install_dir);

            for entry in WalkDir::new(&base)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
            {
                let entry = entry.with_context(|| {
                    format!("failed to walk install directory: {}", base.display())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&base)
                    .expect("walkdir entry under its base");

                let destination = dest_dir.join(rel);
                let tag = subdir
                    .tag
                    .clone()
                    .unwrap_or_else(|| self.guess_tag(&dest_dir, None));
                self.check_collision(&tag, &destination)?;
                entries.push(InstallEntry {
                    source: entry.path().to_path_buf(),
                    destination,
                    dest_template: format!("{}/{}", subdir.install_dir, rel.display()),
                    mode: subdir.mode,
                    subproject: subdir.subproject.clone(),
                    tag,
                    optional: false,
                    strip: false,
                    rpath_dirs: Vec::new(),
                });
            }
        }
        Ok(())
    }

    fn collect_symlinks(&mut self, entries: &mut Vec<SymlinkEntry>) -> Result<()> {
        for link in &self.graph.symlinks {
            let dest_dir = self.ctx.dirs.resolve(&link.install_dir);
            let tag = link
                .tag
                .clone()
                .unwrap_or_else(|| self.guess_tag(&dest_dir, None));
            self.check_collision(&tag, &dest_dir.join(&link.name))?;
            entries.push(SymlinkEntry {
                target: link.target.clone(),
                name: link.name.clone(),
                destination: dest_dir,
                dest_template: link.install_dir.clone(),
                allow_missing: link.allow_missing,
                tag,
                subproject: link.subproject.clone(),
            });
        }
        Ok(())
    }

    fn collect_emptydirs(&mut self, entries: &mut Vec<EmptyDirEntry>) {
        // Empty dirs may legally coincide with parent directories of other
        // entries, so they skip the collision check.
        for dir in &self.graph.emptydirs {
            let path = self.ctx.dirs.resolve(&dir.path);
            let tag = dir
                .tag
                .clone()
                .unwrap_or_else(|| self.guess_tag(&path, None));
            entries.push(EmptyDirEntry {
                path,
                dest_template: dir.path.clone(),
                mode: dir.mode,
                tag,
                subproject: dir.subproject.clone(),
            });
        }
    }

    fn collect_scripts(
        &mut self,
        planner: &mut PathPlanner<'g>,
        entries: &mut Vec<InstallScript>,
    ) -> Result<()> {
        let evaluator = CustomCommandEvaluator::new(self.graph, self.ctx);

        for script in &self.graph.install_scripts {
            let (argv, _deps) =
                evaluator.evaluate_script("install script", &script.command, planner)?;

            // A named external tool must resolve now, not at install time
            let argv = match script.command.first() {
                Some(CommandToken::Str { .. }) => {
                    let program = self.resolver.resolve(&argv[0]);
                    let mut resolved: Vec<String> = program.command()?.to_vec();
                    resolved.extend(argv.into_iter().skip(1));
                    resolved
                }
                _ => argv,
            };

            entries.push(InstallScript {
                exe: ExecutableSerialisation::new(argv)
                    .with_workdir(Some(self.ctx.build_root.clone())),
                skip_if_destdir: script.skip_if_destdir,
                tag: script.tag.clone().unwrap_or(InstallTag::Runtime),
                subproject: script.subproject.clone(),
            });
        }
        Ok(())
    }

    /// Guess a semantic tag from the resolved destination directory.
    fn guess_tag(&self, dest_dir: &Path, kind: Option<TargetKind>) -> InstallTag {
        let dirs = &self.ctx.dirs;
        if dest_dir.starts_with(dirs.absolute(&dirs.includedir)) {
            InstallTag::Devel
        } else if dest_dir.starts_with(dirs.absolute(&dirs.localedir)) {
            InstallTag::I18n
        } else if dest_dir.starts_with(dirs.absolute(&dirs.mandir)) {
            InstallTag::Man
        } else if dest_dir.starts_with(dirs.absolute(&dirs.libdir)) {
            if kind == Some(TargetKind::StaticLib) {
                InstallTag::Devel
            } else {
                InstallTag::Runtime
            }
        } else {
            InstallTag::Runtime
        }
    }

    /// Reject a second entry for the same (tag, destination) pair.
    fn check_collision(&mut self, tag: &InstallTag, destination: &Path) -> Result<()> {
        let key = (tag.to_string(), destination.to_path_buf());
        if !self.seen.insert(key) {
            return Err(InstallCollisionError {
                dest: destination.to_path_buf(),
                tag: tag.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// The default destination for a man page: section directory, with an
/// optional locale level.
fn default_man_dir(man: &ManInstall, file_name: &str) -> String {
    let section = file_name
        .rsplit('.')
        .next()
        .filter(|s| s.len() == 1 && s.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or("1");
    match &man.locale {
        Some(locale) => format!("{{mandir}}/{}/man{}", locale, section),
        None => format!("{{mandir}}/man{}", section),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{DataInstall, HeaderInstall, SymlinkInstall};
    use crate::core::target::{FileRef, InstallDirSpec, InstallDirective};
    use crate::test_support::{
        build_target, empty_graph, push_target, test_context, StubProgramResolver,
    };

    fn installable(name: &str, subdir: &str, kind: TargetKind, dir: &str) -> AnyTarget {
        let mut target = build_target(name, subdir, kind);
        target.install = Some(InstallDirective {
            dirs: vec![InstallDirSpec::Dir(dir.to_string())],
            mode: None,
            tag: None,
            optional: false,
        });
        AnyTarget::Build(target)
    }

    fn build_plan(graph: &BuildGraph) -> Result<InstallPlan> {
        let ctx = test_context(graph);
        let resolver = StubProgramResolver::new();
        let mut planner = PathPlanner::new(graph, &ctx);
        let mut search = SearchPathResolver::new(graph, &ctx);
        InstallPlanBuilder::new(graph, &ctx, &resolver).build(&mut planner, &mut search)
    }

    #[test]
    fn test_single_output_target_yields_one_entry() {
        let mut graph = empty_graph();
        push_target(
            &mut graph,
            installable("app", "src", TargetKind::Executable, "{bindir}"),
        );

        let plan = build_plan(&graph).unwrap();
        assert_eq!(plan.targets.len(), 1);

        let entry = &plan.targets[0];
        assert_eq!(entry.source, PathBuf::from("/work/build/src/app"));
        assert_eq!(entry.destination, PathBuf::from("/usr/local/bin/app"));
        assert_eq!(entry.dest_template, "{bindir}/app");
        assert_eq!(entry.tag, InstallTag::Runtime);
    }

    #[test]
    fn test_skipped_output_is_not_installed() {
        let mut graph = empty_graph();
        let mut target = build_target("mylib", "lib", TargetKind::SharedLib);
        target.outputs = vec!["libmylib.so".to_string(), "mylib.pdb".to_string()];
        target.install = Some(InstallDirective {
            dirs: vec![
                InstallDirSpec::Dir("{libdir}".to_string()),
                InstallDirSpec::Skip(false),
            ],
            mode: None,
            tag: None,
            optional: false,
        });
        push_target(&mut graph, AnyTarget::Build(target));

        let plan = build_plan(&graph).unwrap();
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(
            plan.targets[0].destination,
            PathBuf::from("/usr/local/lib/libmylib.so")
        );
    }

    #[test]
    fn test_install_dir_count_mismatch_errors() {
        let mut graph = empty_graph();
        let mut target = build_target("mylib", "lib", TargetKind::SharedLib);
        target.outputs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        target.install = Some(InstallDirective {
            dirs: vec![
                InstallDirSpec::Dir("{libdir}".to_string()),
                InstallDirSpec::Dir("{libdir}".to_string()),
            ],
            mode: None,
            tag: None,
            optional: false,
        });
        push_target(&mut graph, AnyTarget::Build(target));

        let err = build_plan(&graph).unwrap_err();
        assert!(err.to_string().contains("mylib"));
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_duplicate_destination_collides() {
        let mut graph = empty_graph();
        graph.data = vec![DataInstall {
            sources: vec![
                FileRef::in_source("", "conf.ini"),
                FileRef::in_source("other", "conf.ini"),
            ],
            install_dir: "{datadir}/demo".to_string(),
            rename: vec![],
            mode: None,
            tag: None,
            subproject: String::new(),
        }];

        let err = build_plan(&graph).unwrap_err();
        assert!(err.to_string().contains("duplicate install destination"));
        assert!(err.to_string().contains("conf.ini"));
    }

    #[test]
    fn test_tag_guessing() {
        let mut graph = empty_graph();
        push_target(
            &mut graph,
            installable("app", "", TargetKind::Executable, "{bindir}"),
        );
        push_target(
            &mut graph,
            installable("libshared.so", "", TargetKind::SharedLib, "{libdir}"),
        );
        push_target(
            &mut graph,
            installable("libstatic.a", "", TargetKind::StaticLib, "{libdir}"),
        );

        graph.data = vec![DataInstall {
            sources: vec![FileRef::in_source("po", "de.mo")],
            install_dir: "{localedir}/de/LC_MESSAGES".to_string(),
            rename: vec![],
            mode: None,
            tag: None,
            subproject: String::new(),
        }];

        let plan = build_plan(&graph).unwrap();
        assert_eq!(plan.targets[0].tag, InstallTag::Runtime);
        assert_eq!(plan.targets[1].tag, InstallTag::Runtime);
        assert_eq!(plan.targets[2].tag, InstallTag::Devel);
        assert_eq!(plan.data[0].tag, InstallTag::I18n);
    }

    #[test]
    fn test_installed_library_records_rpath_dirs() {
        let mut graph = empty_graph();
        let mut lib = build_target("libdemo.so", "", TargetKind::SharedLib);
        lib.external_deps = vec![crate::test_support::external_dep(
            "foo",
            &["/opt/lib/libfoo.so"],
        )];
        lib.install = Some(InstallDirective {
            dirs: vec![InstallDirSpec::Dir("{libdir}".to_string())],
            mode: None,
            tag: None,
            optional: false,
        });
        push_target(&mut graph, AnyTarget::Build(lib));

        let plan = build_plan(&graph).unwrap();
        assert_eq!(plan.targets[0].rpath_dirs, vec![PathBuf::from("/opt/lib")]);
    }

    #[test]
    fn test_headers_default_dir_and_subdir() {
        let mut graph = empty_graph();
        graph.headers = vec![HeaderInstall {
            sources: vec![FileRef::in_source("include", "api.h")],
            install_dir: None,
            subdir: Some("demo".to_string()),
            subproject: String::new(),
        }];

        let plan = build_plan(&graph).unwrap();
        assert_eq!(
            plan.headers[0].destination,
            PathBuf::from("/usr/local/include/demo/api.h")
        );
        assert_eq!(plan.headers[0].tag, InstallTag::Devel);
    }

    #[test]
    fn test_man_section_and_locale() {
        let mut graph = empty_graph();
        graph.man = vec![
            ManInstall {
                sources: vec![FileRef::in_source("doc", "demo.1")],
                install_dir: None,
                locale: None,
                subproject: String::new(),
            },
            ManInstall {
                sources: vec![FileRef::in_source("doc/de", "demo.3")],
                install_dir: None,
                locale: Some("de".to_string()),
                subproject: String::new(),
            },
        ];

        let plan = build_plan(&graph).unwrap();
        assert_eq!(
            plan.man[0].destination,
            PathBuf::from("/usr/local/share/man/man1/demo.1")
        );
        assert_eq!(
            plan.man[1].destination,
            PathBuf::from("/usr/local/share/man/de/man3/demo.3")
        );
        assert_eq!(plan.man[0].tag, InstallTag::Man);
    }

    #[test]
    fn test_data_rename() {
        let mut graph = empty_graph();
        graph.data = vec![DataInstall {
            sources: vec![FileRef::in_source("etc", "app.conf.in")],
            install_dir: "{sysconfdir}".to_string(),
            rename: vec!["app.conf".to_string()],
            mode: Some(0o644),
            tag: None,
            subproject: String::new(),
        }];

        let plan = build_plan(&graph).unwrap();
        assert_eq!(
            plan.data[0].destination,
            PathBuf::from("/usr/local/etc/app.conf")
        );
        assert_eq!(plan.data[0].mode, Some(0o644));
    }

    #[test]
    fn test_symlink_collides_with_file_entry() {
        let mut graph = empty_graph();
        push_target(
            &mut graph,
            installable("app", "", TargetKind::Executable, "{bindir}"),
        );
        graph.symlinks = vec![SymlinkInstall {
            target: "app-2.0".to_string(),
            name: "app".to_string(),
            install_dir: "{bindir}".to_string(),
            allow_missing: false,
            tag: None,
            subproject: String::new(),
        }];

        let err = build_plan(&graph).unwrap_err();
        assert!(err.to_string().contains("duplicate install destination"));
    }

    #[test]
    fn test_subdir_tree_is_expanded() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("assets/icons")).unwrap();
        std::fs::write(tmp.path().join("assets/readme.txt"), "r").unwrap();
        std::fs::write(tmp.path().join("assets/icons/app.png"), "p").unwrap();

        let mut graph = empty_graph();
        graph.subdirs = vec![crate::core::graph::SubdirInstall {
            source_dir: PathBuf::from("assets"),
            install_dir: "{datadir}/demo".to_string(),
            mode: None,
            tag: None,
            subproject: String::new(),
        }];

        let config = crate::util::config::BackendConfig::default();
        let ctx = LoweringContext::new(
            tmp.path(),
            tmp.path().join("build"),
            &graph,
            &config,
            vec!["stevedore".to_string()],
        );
        let resolver = StubProgramResolver::new();
        let mut planner = PathPlanner::new(&graph, &ctx);
        let mut search = SearchPathResolver::new(&graph, &ctx);
        let plan = InstallPlanBuilder::new(&graph, &ctx, &resolver)
            .build(&mut planner, &mut search)
            .unwrap();

        assert_eq!(plan.subdirs.len(), 2);
        let dests: Vec<_> = plan.subdirs.iter().map(|e| e.destination.clone()).collect();
        assert!(dests.contains(&PathBuf::from("/usr/local/share/demo/readme.txt")));
        assert!(dests.contains(&PathBuf::from("/usr/local/share/demo/icons/app.png")));
    }

    #[test]
    fn test_install_script_resolves_program() {
        let mut graph = empty_graph();
        graph.install_scripts = vec![crate::core::graph::ScriptInstall {
            command: vec![
                CommandToken::str("postinstall"),
                CommandToken::str("@SOURCE_ROOT@"),
            ],
            skip_if_destdir: true,
            tag: None,
            subproject: String::new(),
        }];

        let ctx = test_context(&graph);
        let resolver =
            StubProgramResolver::new().with_program("postinstall", &["/usr/bin/postinstall"]);
        let mut planner = PathPlanner::new(&graph, &ctx);
        let mut search = SearchPathResolver::new(&graph, &ctx);
        let plan = InstallPlanBuilder::new(&graph, &ctx, &resolver)
            .build(&mut planner, &mut search)
            .unwrap();

        let script = &plan.install_scripts[0];
        assert!(script.skip_if_destdir);
        assert_eq!(
            script.exe.cmd_args(),
            &["/usr/bin/postinstall".to_string(), "/work/src".to_string()]
        );
    }

    #[test]
    fn test_install_script_missing_program_errors() {
        let mut graph = empty_graph();
        graph.install_scripts = vec![crate::core::graph::ScriptInstall {
            command: vec![CommandToken::str("nope")],
            skip_if_destdir: false,
            tag: None,
            subproject: String::new(),
        }];

        let err = build_plan(&graph).unwrap_err();
        assert!(err.to_string().contains("nope"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_plan_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut graph = empty_graph();
        push_target(
            &mut graph,
            installable("app", "src", TargetKind::Executable, "{bindir}"),
        );

        let plan = build_plan(&graph).unwrap();
        let path = tmp.path().join("install_plan.json");
        plan.save(&path).unwrap();

        let loaded = InstallPlan::load(&path).unwrap();
        assert_eq!(loaded.targets, plan.targets);
        assert_eq!(loaded.prefix, plan.prefix);
    }
}
