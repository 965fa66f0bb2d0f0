//! Stevedore - a build-graph lowering backend
//!
//! This crate turns an already-resolved build graph (targets, custom
//! commands, tests, install rules) into concrete, platform-correct
//! artifacts: an install manifest, serialized test and benchmark plans,
//! runtime library search paths, and runnable (or serialized) command
//! lines for external drivers.

pub mod backend;
pub mod core;
pub mod ops;
pub mod util;

/// Test fixtures and stubs for Stevedore unit tests.
///
/// This module is only available when compiling tests. It provides graph
/// and context builders plus a stub program resolver.
#[cfg(test)]
pub mod test_support;

pub use backend::{
    CustomCommandEvaluator, ExecutableSerialisation, InstallPlan, InstallPlanBuilder, Invocation,
    InvocationSerializer, LoweringContext, PathPlanner, RegenInfo, SearchPathResolver, TestPlan,
    TestPlanBuilder,
};
pub use crate::core::{BuildGraph, MachineContext, ProgramResolver, SystemProgramResolver, TargetId};
pub use ops::{lower, LowerOptions, LowerResult};
