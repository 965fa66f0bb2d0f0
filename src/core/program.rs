//! External program resolution.
//!
//! The backend never walks PATH itself; it asks a [`ProgramResolver`] and
//! only post-processes the returned invocation vector. The default resolver
//! handles executable-extension search (via `which`) and shebang rewriting
//! for scripts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::diagnostic::ProgramNotFoundError;

/// A resolved (or unresolved) external program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalProgram {
    /// The logical name the program was requested under
    pub name: String,

    /// Invocation vector; empty when the program was not found
    #[serde(default)]
    command: Vec<String>,

    /// Canonical path to the executable, when found
    #[serde(default)]
    path: Option<PathBuf>,
}

impl ExternalProgram {
    /// A program that was successfully resolved.
    pub fn found(name: impl Into<String>, command: Vec<String>, path: PathBuf) -> Self {
        ExternalProgram {
            name: name.into(),
            command,
            path: Some(path),
        }
    }

    /// A program that could not be resolved.
    pub fn not_found(name: impl Into<String>) -> Self {
        ExternalProgram {
            name: name.into(),
            command: Vec::new(),
            path: None,
        }
    }

    /// A program with an already-known invocation vector (no search).
    pub fn from_command(name: impl Into<String>, command: Vec<String>) -> Self {
        let path = command.first().map(PathBuf::from);
        ExternalProgram {
            name: name.into(),
            command,
            path,
        }
    }

    /// Whether resolution succeeded.
    pub fn is_found(&self) -> bool {
        !self.command.is_empty()
    }

    /// The invocation vector; fails with the program's name when unresolved.
    pub fn command(&self) -> Result<&[String], ProgramNotFoundError> {
        if self.is_found() {
            Ok(&self.command)
        } else {
            Err(ProgramNotFoundError {
                program: self.name.clone(),
            })
        }
    }

    /// Canonical executable path, when found.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Resolves a logical program reference to a concrete invocation vector.
pub trait ProgramResolver {
    /// Resolve a program by name or path. Always returns a value; check
    /// [`ExternalProgram::is_found`] for the outcome.
    fn resolve(&self, name_or_path: &str) -> ExternalProgram;
}

/// Resolver backed by the system PATH.
#[derive(Debug, Default)]
pub struct SystemProgramResolver;

impl ProgramResolver for SystemProgramResolver {
    fn resolve(&self, name_or_path: &str) -> ExternalProgram {
        let candidate = Path::new(name_or_path);
        let path = if candidate.is_absolute() || name_or_path.contains(std::path::MAIN_SEPARATOR) {
            candidate.is_file().then(|| candidate.to_path_buf())
        } else {
            which::which(name_or_path).ok()
        };

        let Some(path) = path else {
            return ExternalProgram::not_found(name_or_path);
        };

        let command = match shebang_command(&path) {
            Some(mut interp) => {
                interp.push(path.display().to_string());
                interp
            }
            None => vec![path.display().to_string()],
        };

        ExternalProgram::found(name_or_path, command, path)
    }
}

/// Parse a script's shebang line into an interpreter invocation.
///
/// Returns None for binaries and scripts without a shebang.
fn shebang_command(path: &Path) -> Option<Vec<String>> {
    let contents = std::fs::read(path).ok()?;
    let line = contents.strip_prefix(b"#!")?;
    let end = line.iter().position(|&b| b == b'\n').unwrap_or(line.len());
    let line = std::str::from_utf8(&line[..end]).ok()?;

    let mut parts = line.split_whitespace();
    let interpreter = parts.next()?;

    // `#!/usr/bin/env prog` resolves through env's argument instead
    let mut command = if interpreter.ends_with("/env") {
        vec![parts.next()?.to_string()]
    } else {
        vec![interpreter.to_string()]
    };
    command.extend(parts.map(str::to_string));
    Some(command)
}
