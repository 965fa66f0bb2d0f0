//! Graph lowering: plans, paths, and runnable command lines.
//!
//! This module turns the resolved build graph into the artifacts external
//! drivers consume:
//! - Install manifest assembly
//! - Test and benchmark plan serialization
//! - Runtime library search paths (RPATH / extra PATH)
//! - Custom command evaluation
//! - Direct-or-serialized invocation planning

pub mod context;
pub mod custom;
pub mod exec;
pub mod install;
pub mod paths;
pub mod regen;
pub mod rpath;
pub mod testplan;

pub use context::LoweringContext;
pub use custom::{CustomCommandEvaluator, EvaluatedCommand};
pub use exec::{ExecutableSerialisation, Invocation, InvocationSerializer};
pub use install::{EmptyDirEntry, InstallEntry, InstallPlan, InstallPlanBuilder, SymlinkEntry};
pub use paths::PathPlanner;
pub use regen::RegenInfo;
pub use rpath::SearchPathResolver;
pub use testplan::{TestPlan, TestPlanBuilder, TestSerialisation};
