//! `stevedore lower` command

use anyhow::{Context, Result};

use crate::cli::LowerArgs;
use stevedore::core::program::SystemProgramResolver;
use stevedore::ops::lower::{lower, LowerOptions};

pub fn execute(args: LowerArgs) -> Result<()> {
    let own_binary = std::env::current_exe()
        .context("failed to determine the backend's own binary path")?;

    let opts = LowerOptions {
        source_dir: args.source_dir,
        build_dir: args.build_dir,
        graph_path: args.graph,
        config_path: args.config,
        build_command: vec![own_binary.display().to_string()],
    };

    let result = lower(&opts, &SystemProgramResolver)?;

    eprintln!(
        "    Lowered {} install entries, {} tests, {} benchmarks",
        result.installed_files, result.test_count, result.benchmark_count
    );
    eprintln!("    Install plan -> {}", result.install_plan_path.display());
    eprintln!("    Test plan    -> {}", result.test_plan_path.display());

    Ok(())
}
