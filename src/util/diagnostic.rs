//! Typed error taxonomy for the lowering pass.
//!
//! Three families, all fatal: configuration errors (bad build description,
//! reported with the offending target or command name), environment errors
//! (missing programs or wrappers, reported with a remediation hint), and
//! staleness errors (clock skew on regeneration inputs). There is no retry
//! anywhere; a failed pass persists nothing.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

/// An external program could not be resolved.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("program `{program}` not found")]
#[diagnostic(
    code(stevedore::env::program_not_found),
    help("Install `{program}` or ensure it is on PATH")
)]
pub struct ProgramNotFoundError {
    pub program: String,
}

/// A cross-execution wrapper is required but not configured.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("can not run host binary `{binary}` on this build machine")]
#[diagnostic(
    code(stevedore::env::exe_wrapper_missing),
    help("Define an exe wrapper in the cross configuration and ensure it is on PATH")
)]
pub struct ExeWrapperMissingError {
    pub binary: String,
}

/// A target declares a number of install directories that does not match
/// its outputs.
#[derive(Debug, Error, MietteDiagnostic)]
#[error(
    "target `{target}` declares {dirs} install directories for {outputs} outputs \
     (need one shared directory or one per output)"
)]
#[diagnostic(code(stevedore::config::install_count_mismatch))]
pub struct InstallCountMismatchError {
    pub target: String,
    pub outputs: usize,
    pub dirs: usize,
}

/// Two install entries resolve to the same destination under the same tag.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("duplicate install destination `{dest}` (tag `{tag}`)")]
#[diagnostic(
    code(stevedore::config::install_collision),
    help("Two install rules write the same file; rename one output or change its install_dir")
)]
pub struct InstallCollisionError {
    pub dest: PathBuf,
    pub tag: String,
}

/// `@DEPFILE@` was referenced by a command with no declared depfile.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("target `{target}` references @DEPFILE@ but declares no depfile")]
#[diagnostic(code(stevedore::config::missing_depfile))]
pub struct MissingDepfileError {
    pub target: String,
}

/// An indexed placeholder points past the declared inputs or outputs.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("target `{target}` references `{placeholder}` but declares only {available} {kind}")]
#[diagnostic(code(stevedore::config::placeholder_out_of_range))]
pub struct PlaceholderIndexError {
    pub target: String,
    pub placeholder: String,
    pub kind: &'static str,
    pub available: usize,
}

/// A `--just-symbols` linker path does not live in an existing directory.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("--just-symbols path `{path}` is not inside an existing directory")]
#[diagnostic(
    code(stevedore::config::invalid_just_symbols),
    help("A --just-symbols argument must name a library file in a real directory")
)]
pub struct InvalidJustSymbolsError {
    pub path: PathBuf,
}

/// A non-linkable target was handed to a link-dependency walk.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("target `{target}` is not linkable and cannot appear in link dependencies")]
#[diagnostic(code(stevedore::config::unlinkable_target))]
pub struct UnlinkableTargetError {
    pub target: String,
}

/// A regeneration dependency is newer than the present; continuing would
/// reconfigure forever.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("clock skew detected: `{file}` is modified in the future")]
#[diagnostic(
    code(stevedore::stale::clock_skew),
    help("Fix the system clock (or the file's timestamp) and reconfigure")
)]
pub struct ClockSkewError {
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_name_the_offender() {
        let err = InstallCountMismatchError {
            target: "mylib".to_string(),
            outputs: 2,
            dirs: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("mylib"));
        assert!(msg.contains('2'));
        assert!(msg.contains('3'));

        let err = MissingDepfileError {
            target: "gen".to_string(),
        };
        assert!(err.to_string().contains("@DEPFILE@"));
    }

    #[test]
    fn test_collision_error_mentions_tag_and_dest() {
        let err = InstallCollisionError {
            dest: PathBuf::from("/usr/local/bin/tool"),
            tag: "runtime".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/usr/local/bin/tool"));
        assert!(msg.contains("runtime"));
    }
}
