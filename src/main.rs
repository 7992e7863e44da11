use std::io;
use std::os::unix::ffi::OsStrExt;

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use utrace::config::{self, Opt, TraceConfig};
use utrace::{trace_command, Command, Policy, SyscallTable};

fn init_tracing(debug: bool) {
    let level = if debug { Level::TRACE } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    // Read once, and cleared before the tracee is spawned.
    let debug = config::take_debug_flag();
    init_tracing(debug);

    let config = TraceConfig::new(opt, debug);

    let mut cmd = Command::new(config.argv.clone())?;

    if let Some(lib) = &config.preload {
        cmd = cmd.preload(lib.as_os_str().as_bytes().to_vec())?;
    }

    let table = SyscallTable::native();

    let trace = trace_command(cmd, &table)
        .with_context(|| format!("failed to trace {}", config.argv[0]))?;

    let policy = Policy::emit(trace.counts, &table, config.policy);
    let output = config.output_path(trace.root);

    policy.save(Some(&output))?;

    Ok(())
}
