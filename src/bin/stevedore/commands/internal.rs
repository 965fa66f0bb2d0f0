//! `stevedore internal` drivers
//!
//! These subcommands are not meant for people: generated build files invoke
//! them to run serialized executables and to check regeneration staleness.

use std::time::SystemTime;

use anyhow::{bail, Context, Result};

use crate::cli::{ExeArgs, InternalArgs, InternalCommands, RegencheckArgs};
use stevedore::backend::exec::{run_serialized, ExecutableSerialisation};
use stevedore::backend::regen::RegenInfo;

pub fn execute(args: InternalArgs) -> Result<()> {
    match args.command {
        InternalCommands::Exe(args) => exe(args),
        InternalCommands::Regencheck(args) => regencheck(args),
    }
}

/// Run a serialized invocation (or a bare argv) and exit with the child's
/// exit code.
fn exe(args: ExeArgs) -> Result<()> {
    let invocation = match args.unpickle {
        Some(ref path) => {
            let mut loaded = ExecutableSerialisation::load(path)?;
            // CLI redirections win over the serialized ones; the value is
            // rebuilt, never patched in place
            if args.capture.is_some() {
                loaded = loaded.with_capture(args.capture);
            }
            if args.feed.is_some() {
                loaded = loaded.with_feed(args.feed);
            }
            loaded
        }
        None => {
            if args.args.is_empty() {
                bail!("no command given; pass --unpickle <file> or `-- <argv...>`");
            }
            ExecutableSerialisation::new(args.args)
                .with_capture(args.capture)
                .with_feed(args.feed)
        }
    };

    let code = run_serialized(&invocation)?;
    std::process::exit(code);
}

/// Report whether the configuration is stale, aborting on clock skew.
fn regencheck(args: RegencheckArgs) -> Result<()> {
    let info_path = args.build_dir.join(".stevedore").join("regen_info.json");
    let info = RegenInfo::load(&info_path)?;

    info.check_clock_skew(SystemTime::now())?;

    let stamp = std::fs::metadata(&info_path)
        .and_then(|m| m.modified())
        .with_context(|| format!("failed to stat {}", info_path.display()))?;

    if info.needs_regen(stamp) {
        println!("regeneration required");
    } else {
        println!("up to date");
    }
    Ok(())
}
