//! External dependencies.
//!
//! An external dependency is anything resolved outside the target graph
//! (pkg-config results, system libraries, hand-written link args). The
//! backend only ever sees its raw linker arguments.

use serde::{Deserialize, Serialize};

/// An external dependency with its raw linker arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalDependency {
    /// Dependency name, for diagnostics
    pub name: String,

    /// Raw linker arguments as resolved upstream
    #[serde(default)]
    pub link_args: Vec<String>,
}

impl ExternalDependency {
    /// Create a dependency from a name and link arguments.
    pub fn new(name: impl Into<String>, link_args: Vec<String>) -> Self {
        ExternalDependency {
            name: name.into(),
            link_args,
        }
    }
}
