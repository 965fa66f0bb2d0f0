//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Stevedore - a build-graph lowering backend
#[derive(Parser)]
#[command(name = "stevedore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lower a build graph into install, test, and benchmark plans
    Lower(LowerArgs),

    /// Internal drivers invoked from generated build files
    Internal(InternalArgs),
}

#[derive(Args)]
pub struct LowerArgs {
    /// Source tree root
    #[arg(long, default_value = ".")]
    pub source_dir: PathBuf,

    /// Build tree root
    #[arg(long)]
    pub build_dir: PathBuf,

    /// Serialized build graph (JSON)
    #[arg(long)]
    pub graph: PathBuf,

    /// Backend configuration file (defaults to <source>/stevedore.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct InternalArgs {
    #[command(subcommand)]
    pub command: InternalCommands,
}

#[derive(Subcommand)]
pub enum InternalCommands {
    /// Run a (possibly serialized) executable invocation
    Exe(ExeArgs),

    /// Check whether reconfiguration is needed
    Regencheck(RegencheckArgs),
}

#[derive(Args)]
pub struct ExeArgs {
    /// Write the child's stdout to this file
    #[arg(long)]
    pub capture: Option<PathBuf>,

    /// Feed the child's stdin from this file
    #[arg(long)]
    pub feed: Option<PathBuf>,

    /// Load a serialized invocation instead of taking a bare argv
    #[arg(long, conflicts_with = "args")]
    pub unpickle: Option<PathBuf>,

    /// Bare argv to run, after `--`
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(Args)]
pub struct RegencheckArgs {
    /// Build tree root
    #[arg(long)]
    pub build_dir: PathBuf,
}
