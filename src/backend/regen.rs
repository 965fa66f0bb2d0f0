//! Regeneration trigger bookkeeping.
//!
//! The regen-info file records which files the configuration was derived
//! from; the regeneration check compares their mtimes against the stamp of
//! the last lowering pass. A dependency file modified in the future relative
//! to wall-clock now means clock skew, and continuing would reconfigure
//! forever, so that case aborts instead.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::util::fs::write_atomic;

/// Allowance for filesystem timestamp granularity.
const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_millis(1);

/// What the configuration was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenInfo {
    /// Source tree root
    pub source_dir: PathBuf,

    /// Build tree root
    pub build_dir: PathBuf,

    /// Files whose change triggers reconfiguration, relative to the source
    /// root
    pub depfiles: Vec<PathBuf>,
}

impl RegenInfo {
    /// Persist atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Load a persisted regen-info file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read regen info: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse regen info: {}", path.display()))
    }

    /// Absolute paths of the dependency files.
    pub fn dep_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.depfiles.iter().map(|f| self.source_dir.join(f))
    }

    /// Fail if any dependency file is modified in the future.
    pub fn check_clock_skew(&self, now: SystemTime) -> Result<()> {
        let limit = now + CLOCK_SKEW_TOLERANCE;
        for path in self.dep_paths() {
            let Ok(meta) = std::fs::metadata(&path) else {
                continue;
            };
            let mtime = meta.modified().with_context(|| {
                format!("failed to read modification time: {}", path.display())
            })?;
            if mtime > limit {
                return Err(crate::util::diagnostic::ClockSkewError { file: path }.into());
            }
        }
        Ok(())
    }

    /// Whether any dependency file changed after the given stamp.
    ///
    /// A missing dependency file counts as changed.
    pub fn needs_regen(&self, stamp: SystemTime) -> bool {
        for path in self.dep_paths() {
            let Ok(meta) = std::fs::metadata(&path) else {
                debug!("regen dependency missing: {}", path.display());
                return true;
            };
            match meta.modified() {
                Ok(mtime) if mtime > stamp => return true,
                Ok(_) => {}
                Err(_) => return true,
            }
        }
        false
    }
}
