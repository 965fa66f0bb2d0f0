//! High-level operations.
//!
//! This module contains the implementation of Stevedore commands.

pub mod lower;

pub use lower::{lower, LowerOptions, LowerResult};
