//! Command implementations

pub mod internal;
pub mod lower;
