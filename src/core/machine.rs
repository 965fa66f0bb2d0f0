//! Build and host machine handling.
//!
//! Every path and command decision that depends on "which machine runs this"
//! takes an explicit machine value; nothing in the backend reads ambient
//! platform state.

use serde::{Deserialize, Serialize};

/// Which of the two configured machines a target is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineChoice {
    /// The machine the build itself runs on.
    Build,

    /// The machine the produced artifacts will run on.
    Host,
}

impl Default for MachineChoice {
    fn default() -> Self {
        MachineChoice::Host
    }
}

/// Description of one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    /// Operating system name ("linux", "darwin", "windows", ...)
    pub system: String,

    /// CPU family ("x86_64", "aarch64", "x86", ...)
    #[serde(default)]
    pub cpu_family: String,
}

impl MachineInfo {
    /// Create a machine description.
    pub fn new(system: impl Into<String>, cpu_family: impl Into<String>) -> Self {
        MachineInfo {
            system: system.into(),
            cpu_family: cpu_family.into(),
        }
    }

    /// Check if this machine runs Windows.
    pub fn is_windows(&self) -> bool {
        self.system == "windows"
    }

    /// Check if this machine runs macOS.
    pub fn is_darwin(&self) -> bool {
        self.system == "darwin"
    }

    /// Check whether binaries for `other` can run directly on this machine.
    ///
    /// Same system plus an identical or narrower CPU family counts as
    /// runnable (an x86_64 machine executes x86 binaries).
    pub fn can_run(&self, other: &MachineInfo) -> bool {
        if self.system != other.system {
            return false;
        }
        if self.cpu_family == other.cpu_family {
            return true;
        }
        matches!(
            (self.cpu_family.as_str(), other.cpu_family.as_str()),
            ("x86_64", "x86") | ("aarch64", "arm")
        )
    }
}

/// The build/host machine pair for one lowering pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineContext {
    /// Machine the build runs on
    pub build: MachineInfo,

    /// Machine the built artifacts target
    pub host: MachineInfo,

    /// Wrapper argv for running host binaries on the build machine
    /// (emulator or interpreter from the cross configuration)
    #[serde(default)]
    pub exe_wrapper: Option<Vec<String>>,
}

impl MachineContext {
    /// Create a native (non-cross) context.
    pub fn native(machine: MachineInfo) -> Self {
        MachineContext {
            build: machine.clone(),
            host: machine,
            exe_wrapper: None,
        }
    }

    /// Look up the description for a machine choice.
    pub fn machine(&self, choice: MachineChoice) -> &MachineInfo {
        match choice {
            MachineChoice::Build => &self.build,
            MachineChoice::Host => &self.host,
        }
    }

    /// Check if this is a cross build (host differs from build machine).
    pub fn is_cross(&self) -> bool {
        self.build != self.host
    }

    /// Check whether a binary built for `choice` needs an exe wrapper to
    /// run on the build machine.
    pub fn needs_exe_wrapper(&self, choice: MachineChoice) -> bool {
        choice == MachineChoice::Host && self.is_cross() && !self.build.can_run(&self.host)
    }
}
