//! Configuration file support for Stevedore.
//!
//! The backend reads one optional TOML file with two sections:
//! - `[layout]` - how target output directories mirror the source tree
//! - `[dirs]` - the installation directory layout (prefix, bindir, ...)
//!
//! A missing file means defaults; a malformed file is reported and the
//! defaults are used, matching the rest of the configuration surface.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How target output directories are laid out under the build root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Each target's outputs go under its declaring subdirectory
    Mirror,

    /// All outputs go directly into the build root
    Flat,
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Mirror
    }
}

/// Stevedore configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Output layout settings
    pub layout: LayoutConfig,

    /// Installation directory layout
    pub dirs: DirConfig,
}

/// Output layout settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Layout mode (mirror or flat)
    pub mode: Layout,
}

/// Installation directory layout.
///
/// All directories except `prefix` are relative to the prefix; destination
/// templates reference them as `{bindir}`, `{libdir}`, and so on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirConfig {
    /// Installation prefix
    pub prefix: PathBuf,

    /// Executable directory
    pub bindir: String,

    /// Library directory
    pub libdir: String,

    /// Header directory
    pub includedir: String,

    /// Read-only architecture-independent data directory
    pub datadir: String,

    /// Man page directory
    pub mandir: String,

    /// Locale data directory
    pub localedir: String,

    /// Host configuration directory
    pub sysconfdir: String,
}

impl Default for DirConfig {
    fn default() -> Self {
        DirConfig {
            prefix: PathBuf::from("/usr/local"),
            bindir: "bin".to_string(),
            libdir: "lib".to_string(),
            includedir: "include".to_string(),
            datadir: "share".to_string(),
            mandir: "share/man".to_string(),
            localedir: "share/locale".to_string(),
            sysconfdir: "etc".to_string(),
        }
    }
}

impl BackendConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }
}

impl DirConfig {
    /// Resolve a destination template against this layout.
    ///
    /// Named directory placeholders expand to their prefix-relative location
    /// first, then `{prefix}` expands to the configured prefix, so a template
    /// like `{bindir}` and the equivalent `{prefix}/bin` resolve identically.
    pub fn resolve(&self, template: &str) -> PathBuf {
        let expanded = template
            .replace("{bindir}", &format!("{{prefix}}/{}", self.bindir))
            .replace("{libdir}", &format!("{{prefix}}/{}", self.libdir))
            .replace("{includedir}", &format!("{{prefix}}/{}", self.includedir))
            .replace("{datadir}", &format!("{{prefix}}/{}", self.datadir))
            .replace("{mandir}", &format!("{{prefix}}/{}", self.mandir))
            .replace("{localedir}", &format!("{{prefix}}/{}", self.localedir))
            .replace("{sysconfdir}", &format!("{{prefix}}/{}", self.sysconfdir))
            .replace("{prefix}", &self.prefix.display().to_string());
        PathBuf::from(expanded)
    }

    /// The absolute path of a named directory.
    pub fn absolute(&self, dir: &str) -> PathBuf {
        self.prefix.join(dir)
    }
}
