//! Executable serialization and invocation planning.
//!
//! An invocation is either DIRECT (safe to place on a command line as-is)
//! or SERIALIZED (persisted to a scratch file and re-run through the
//! `--internal exe --unpickle` driver). Serialization is forced by anything
//! a bare command line cannot carry: an environment overlay, a wrapper, a
//! working directory, extra search paths, capture/feed redirection, or an
//! argument containing a newline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::context::LoweringContext;
use crate::core::machine::MachineChoice;
use crate::util::diagnostic::ExeWrapperMissingError;
use crate::util::fs::{ensure_dir, read_to_string};
use crate::util::hash::Fingerprint;
use crate::util::process::ProcessBuilder;

/// A fully-described executable invocation.
///
/// Value object: never mutated after construction. A digest of (argv, env,
/// workdir, capture, feed) names the on-disk scratch file, so a changed
/// invocation is rebuilt, not patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableSerialisation {
    cmd_args: Vec<String>,

    #[serde(default)]
    env: BTreeMap<String, String>,

    #[serde(default)]
    exe_wrapper: Option<Vec<String>>,

    #[serde(default)]
    workdir: Option<PathBuf>,

    #[serde(default)]
    extra_paths: Vec<PathBuf>,

    #[serde(default)]
    capture: Option<PathBuf>,

    #[serde(default)]
    feed: Option<PathBuf>,

    #[serde(default)]
    verbose: bool,
}

impl ExecutableSerialisation {
    /// Create an invocation of the given argv.
    pub fn new(cmd_args: Vec<String>) -> Self {
        ExecutableSerialisation {
            cmd_args,
            env: BTreeMap::new(),
            exe_wrapper: None,
            workdir: None,
            extra_paths: Vec::new(),
            capture: None,
            feed: None,
            verbose: false,
        }
    }

    /// Overlay environment variables on the inherited environment.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Prefix the argv with an exe wrapper (emulator or interpreter).
    pub fn with_wrapper(mut self, wrapper: Option<Vec<String>>) -> Self {
        self.exe_wrapper = wrapper;
        self
    }

    /// Run in the given working directory.
    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    /// Extra search-path entries for locating shared libraries.
    pub fn with_extra_paths(mut self, extra_paths: Vec<PathBuf>) -> Self {
        self.extra_paths = extra_paths;
        self
    }

    /// Capture stdout into a file.
    pub fn with_capture(mut self, capture: Option<PathBuf>) -> Self {
        self.capture = capture;
        self
    }

    /// Feed stdin from a file.
    pub fn with_feed(mut self, feed: Option<PathBuf>) -> Self {
        self.feed = feed;
        self
    }

    pub fn cmd_args(&self) -> &[String] {
        &self.cmd_args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn exe_wrapper(&self) -> Option<&[String]> {
        self.exe_wrapper.as_deref()
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    pub fn extra_paths(&self) -> &[PathBuf] {
        &self.extra_paths
    }

    pub fn capture(&self) -> Option<&Path> {
        self.capture.as_deref()
    }

    pub fn feed(&self) -> Option<&Path> {
        self.feed.as_deref()
    }

    /// The deterministic scratch file name for this invocation.
    ///
    /// A pure function of (argv, env, workdir, capture, feed), so an
    /// unchanged invocation maps to an unchanged file across regenerations.
    pub fn scratch_file_name(&self, basename: &str) -> String {
        let mut fp = Fingerprint::new();
        fp.update_strs(self.cmd_args.iter().map(String::as_str));
        for (key, value) in &self.env {
            fp.update_str(key).update_str(value);
        }
        fp.update_opt(self.workdir.as_ref().map(|p| p.to_string_lossy()).as_deref());
        fp.update_opt(self.capture.as_ref().map(|p| p.to_string_lossy()).as_deref());
        fp.update_opt(self.feed.as_ref().map(|p| p.to_string_lossy()).as_deref());
        format!("{}_{}.json", basename, fp.finish_short())
    }

    /// Persist into `dir` under the digest-stable name and return the path.
    ///
    /// An existing file with the same name is left untouched, so unrelated
    /// regenerations do not disturb its mtime.
    pub fn save(&self, dir: &Path, basename: &str) -> Result<PathBuf> {
        ensure_dir(dir)?;
        let path = dir.join(self.scratch_file_name(basename));
        if path.exists() {
            debug!("scratch file up to date: {}", path.display());
            return Ok(path);
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write scratch file: {}", path.display()))?;
        Ok(path)
    }

    /// Load a previously persisted invocation.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read_to_string(path)?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse scratch file: {}", path.display()))
    }
}

/// The outcome of preparing an invocation: either runnable as-is, or routed
/// through the unpickle driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Runnable directly; argv uses the bare-argv driver form
    Direct { argv: Vec<String> },

    /// Persisted to a scratch file; argv uses the `--unpickle` driver form
    Serialized {
        argv: Vec<String>,
        reason: String,
        scratch_file: PathBuf,
    },
}

impl Invocation {
    /// The runnable argv, whichever form was chosen.
    pub fn argv(&self) -> &[String] {
        match self {
            Invocation::Direct { argv } => argv,
            Invocation::Serialized { argv, .. } => argv,
        }
    }
}

/// Builds runnable command lines from executable serialisations.
pub struct InvocationSerializer<'a> {
    ctx: &'a LoweringContext,
}

impl<'a> InvocationSerializer<'a> {
    pub fn new(ctx: &'a LoweringContext) -> Self {
        InvocationSerializer { ctx }
    }

    /// Decide between the DIRECT and SERIALIZED forms and build the argv.
    ///
    /// Writing the scratch file is the only filesystem mutation in this
    /// component, and only happens on the SERIALIZED path.
    pub fn prepare(&self, basename: &str, exe: &ExecutableSerialisation) -> Result<Invocation> {
        let mut argv = self.ctx.build_command.clone();
        argv.push("internal".to_string());
        argv.push("exe".to_string());

        match serialize_reason(exe) {
            None => {
                argv.push("--".to_string());
                argv.extend(exe.cmd_args.iter().cloned());
                Ok(Invocation::Direct { argv })
            }
            Some(reason) => {
                let scratch_file = exe.save(&self.ctx.scratch_dir(), basename)?;
                argv.push("--unpickle".to_string());
                argv.push(scratch_file.display().to_string());
                Ok(Invocation::Serialized {
                    argv,
                    reason,
                    scratch_file,
                })
            }
        }
    }
}

/// Why an invocation cannot be passed on a bare command line, if it can't.
fn serialize_reason(exe: &ExecutableSerialisation) -> Option<String> {
    if exe.exe_wrapper.is_some() {
        return Some("needs an exe wrapper".to_string());
    }
    if !exe.extra_paths.is_empty() {
        return Some("needs extra search paths".to_string());
    }
    if exe.workdir.is_some() {
        return Some("needs a working directory".to_string());
    }
    if !exe.env.is_empty() {
        return Some("needs an environment overlay".to_string());
    }
    if exe.capture.is_some() || exe.feed.is_some() {
        return Some("needs output capture or input feed".to_string());
    }
    if exe.cmd_args.iter().any(|a| a.contains('\n')) {
        return Some("an argument contains a newline".to_string());
    }
    None
}

/// The argv for running a built artifact, with interpreter prefixes for
/// artifacts the OS cannot execute directly.
pub fn artifact_argv(ctx: &LoweringContext, artifact: &Path) -> Vec<String> {
    let path = artifact.display().to_string();
    let name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".jar") {
        vec!["java".to_string(), "-jar".to_string(), path]
    } else if name.ends_with(".exe") && !ctx.machines.build.is_windows() {
        vec!["mono".to_string(), path]
    } else {
        vec![path]
    }
}

/// The exe wrapper needed to run a binary built for `machine`, if any.
///
/// Needing a wrapper without having one configured is an environment error,
/// not a silent downgrade.
pub fn wrapper_for(
    ctx: &LoweringContext,
    machine: MachineChoice,
    binary: &str,
) -> Result<Option<Vec<String>>> {
    if !ctx.machines.needs_exe_wrapper(machine) {
        return Ok(None);
    }
    match &ctx.machines.exe_wrapper {
        Some(wrapper) => Ok(Some(wrapper.clone())),
        None => Err(ExeWrapperMissingError {
            binary: binary.to_string(),
        }
        .into()),
    }
}

/// Run a serialized invocation to completion and return its exit code.
///
/// This is the body of the `--internal exe --unpickle` driver.
pub fn run_serialized(exe: &ExecutableSerialisation) -> Result<i32> {
    let mut argv: Vec<String> = exe.exe_wrapper.clone().unwrap_or_default();
    argv.extend(exe.cmd_args.iter().cloned());
    anyhow::ensure!(!argv.is_empty(), "serialized invocation has an empty argv");

    let mut pb = ProcessBuilder::new(&argv[0])
        .args(&argv[1..])
        .envs(exe.env.iter());

    // Wine resolves DLLs through WINEPATH, everything else through PATH
    let wine = exe
        .exe_wrapper
        .as_ref()
        .and_then(|w| w.first())
        .map(|w| w.contains("wine"))
        .unwrap_or(false);
    let path_var = if wine { "WINEPATH" } else { "PATH" };
    pb = pb.prepend_search_path(path_var, &exe.extra_paths);

    if let Some(ref workdir) = exe.workdir {
        pb = pb.cwd(workdir);
    }
    if let Some(ref feed) = exe.feed {
        let data = std::fs::read(feed)
            .with_context(|| format!("failed to read feed file: {}", feed.display()))?;
        pb = pb.stdin(data);
    }

    if let Some(ref capture) = exe.capture {
        let output = pb.exec()?;
        std::fs::write(capture, &output.stdout)
            .with_context(|| format!("failed to write capture file: {}", capture.display()))?;
        if !output.stderr.is_empty() {
            use std::io::Write;
            std::io::stderr().write_all(&output.stderr)?;
        }
        Ok(output.status.code().unwrap_or(1))
    } else {
        let status = pb.status()?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::{MachineContext, MachineInfo};
    use crate::test_support::{empty_graph, test_context};
    use tempfile::TempDir;

    fn exe(args: &[&str]) -> ExecutableSerialisation {
        ExecutableSerialisation::new(args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_roundtrip_preserves_tuple() {
        let tmp = TempDir::new().unwrap();
        let original = exe(&["tool", "--flag"])
            .with_env(BTreeMap::from([("KEY".to_string(), "val".to_string())]))
            .with_workdir(Some(PathBuf::from("/work")))
            .with_capture(Some(PathBuf::from("out.txt")));

        let path = original.save(tmp.path(), "tool").unwrap();
        let loaded = ExecutableSerialisation::load(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_scratch_name_is_pure_function() {
        let a = exe(&["tool", "x"]);
        let b = exe(&["tool", "x"]);
        assert_eq!(a.scratch_file_name("tool"), b.scratch_file_name("tool"));

        let c = exe(&["tool", "x"])
            .with_env(BTreeMap::from([("K".to_string(), "v".to_string())]));
        assert_ne!(a.scratch_file_name("tool"), c.scratch_file_name("tool"));

        let d = exe(&["tool", "x"]).with_workdir(Some(PathBuf::from("/w")));
        assert_ne!(a.scratch_file_name("tool"), d.scratch_file_name("tool"));
    }

    #[test]
    fn test_save_leaves_existing_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let invocation = exe(&["tool"]);

        let path = invocation.save(tmp.path(), "tool").unwrap();
        std::fs::write(&path, "sentinel").unwrap();

        let again = invocation.save(tmp.path(), "tool").unwrap();
        assert_eq!(again, path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sentinel");
    }

    #[test]
    fn test_plain_argv_is_direct() {
        let graph = empty_graph();
        let mut ctx = test_context(&graph);
        let tmp = TempDir::new().unwrap();
        ctx.build_root = tmp.path().to_path_buf();

        let serializer = InvocationSerializer::new(&ctx);
        let prepared = serializer.prepare("tool", &exe(&["tool", "arg"])).unwrap();

        match prepared {
            Invocation::Direct { argv } => {
                assert_eq!(argv, vec!["stevedore", "internal", "exe", "--", "tool", "arg"]);
            }
            other => panic!("expected direct invocation, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overlay_forces_unpickle_form() {
        let graph = empty_graph();
        let mut ctx = test_context(&graph);
        let tmp = TempDir::new().unwrap();
        ctx.build_root = tmp.path().to_path_buf();

        let serializer = InvocationSerializer::new(&ctx);
        let invocation = exe(&["tool"])
            .with_env(BTreeMap::from([("K".to_string(), "v".to_string())]));
        let prepared = serializer.prepare("tool", &invocation).unwrap();

        match prepared {
            Invocation::Serialized {
                argv, scratch_file, ..
            } => {
                assert!(argv.contains(&"--unpickle".to_string()));
                assert!(!argv.contains(&"--".to_string()));
                assert!(scratch_file.exists());
            }
            other => panic!("expected serialized invocation, got {:?}", other),
        }
    }

    #[test]
    fn test_newline_argument_forces_serialization() {
        let invocation = exe(&["tool", "multi\nline"]);
        assert!(serialize_reason(&invocation).is_some());

        let plain = exe(&["tool", "one line"]);
        assert!(serialize_reason(&plain).is_none());
    }

    #[test]
    fn test_artifact_argv_prefixes() {
        let graph = empty_graph();
        let ctx = test_context(&graph);

        assert_eq!(
            artifact_argv(&ctx, Path::new("/b/app.jar")),
            vec!["java", "-jar", "/b/app.jar"]
        );
        // Build machine is linux, so .exe needs mono
        assert_eq!(
            artifact_argv(&ctx, Path::new("/b/app.exe")),
            vec!["mono", "/b/app.exe"]
        );
        assert_eq!(artifact_argv(&ctx, Path::new("/b/app")), vec!["/b/app"]);
    }

    #[test]
    fn test_wrapper_for_cross_without_wrapper_errors() {
        let graph = empty_graph();
        let mut ctx = test_context(&graph);
        ctx.machines = MachineContext {
            build: MachineInfo::new("linux", "x86_64"),
            host: MachineInfo::new("linux", "aarch64"),
            exe_wrapper: None,
        };

        let err = wrapper_for(&ctx, MachineChoice::Host, "app").unwrap_err();
        assert!(err.to_string().contains("app"));

        ctx.machines.exe_wrapper = Some(vec!["qemu-aarch64".to_string()]);
        let wrapper = wrapper_for(&ctx, MachineChoice::Host, "app").unwrap();
        assert_eq!(wrapper, Some(vec!["qemu-aarch64".to_string()]));
    }

    #[test]
    fn test_run_serialized_with_capture_and_feed() {
        let tmp = TempDir::new().unwrap();
        let feed = tmp.path().join("feed.txt");
        let capture = tmp.path().join("capture.txt");
        std::fs::write(&feed, "fed\n").unwrap();

        let invocation = exe(&["cat"])
            .with_feed(Some(feed))
            .with_capture(Some(capture.clone()));

        let code = run_serialized(&invocation).unwrap();
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_to_string(&capture).unwrap(), "fed\n");
    }

    #[test]
    fn test_run_serialized_env_and_workdir() {
        let tmp = TempDir::new().unwrap();
        let capture = tmp.path().join("out.txt");

        let invocation = exe(&["sh", "-c", "echo $STEVEDORE_RUN_VAR; pwd"])
            .with_env(BTreeMap::from([(
                "STEVEDORE_RUN_VAR".to_string(),
                "hello".to_string(),
            )]))
            .with_workdir(Some(tmp.path().to_path_buf()))
            .with_capture(Some(capture.clone()));

        let code = run_serialized(&invocation).unwrap();
        assert_eq!(code, 0);
        let out = std::fs::read_to_string(&capture).unwrap();
        assert!(out.starts_with("hello\n"));
        assert!(out.contains(&tmp.path().display().to_string()));
    }
}
