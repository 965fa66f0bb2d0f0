//! Core data structures for Stevedore.
//!
//! This module contains the foundational types consumed by the backend:
//! - The target arena and graph-level declarations
//! - Build/host machine handling
//! - External dependencies and programs

pub mod dependency;
pub mod graph;
pub mod machine;
pub mod program;
pub mod target;

pub use dependency::ExternalDependency;
pub use graph::{BuildGraph, TargetId, TestCase, TestProtocol};
pub use machine::{MachineChoice, MachineContext, MachineInfo};
pub use program::{ExternalProgram, ProgramResolver, SystemProgramResolver};
pub use target::{
    AnyTarget, BuildTarget, CommandToken, CustomTarget, FileRef, InstallDirSpec, InstallDirective,
    InstallTag, TargetKind,
};
