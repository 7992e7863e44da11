//! Command line and environment configuration of a trace run.

use std::env;
use std::path::{Path, PathBuf};

use structopt::{clap::AppSettings, StructOpt};

use crate::policy::DEFAULT_POLICY;
use crate::ptracer::Pid;

/// Environment variable enabling per-event diagnostics. Never passed on to the tracee.
pub const DEBUG_ENV: &str = "TRACE_DEBUG";

#[derive(StructOpt, Debug)]
#[structopt(
    name = "utrace",
    about = "Trace a program and emit the syscall whitelist it needs",
    setting = AppSettings::TrailingVarArg
)]
pub struct Opt {
    /// Write the whitelist here [default: <tmp>/<program>.<pid>.json]
    #[structopt(short = "f", parse(from_os_str))]
    pub output: Option<PathBuf>,

    /// Policy id to embed in the whitelist [default: EPERM]
    #[structopt(short = "p")]
    pub policy: Option<i32>,

    /// Library to inject into the traced program via `LD_PRELOAD`
    #[structopt(long, parse(from_os_str))]
    pub preload: Option<PathBuf>,

    /// Program to trace, and its arguments
    #[structopt(required = true, min_values = 1)]
    pub argv: Vec<String>,
}

/// Settings for one trace run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceConfig {
    pub argv: Vec<String>,
    pub output: Option<PathBuf>,
    pub policy: i32,
    pub preload: Option<PathBuf>,
    pub debug: bool,
}

impl TraceConfig {
    pub fn new(opt: Opt, debug: bool) -> Self {
        let Opt { output, policy, preload, argv } = opt;
        let policy = policy.unwrap_or(DEFAULT_POLICY);

        Self { argv, output, policy, preload, debug }
    }

    /// Where to write the whitelist for a run whose root tracee is `root`.
    pub fn output_path(&self, root: Pid) -> PathBuf {
        if let Some(output) = &self.output {
            return output.clone();
        }

        let program = self.argv.first().map(String::as_str).unwrap_or_default();
        let basename = Path::new(program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_owned());

        env::temp_dir().join(format!("{}.{}.json", basename, root))
    }
}

/// Read the debug flag from the environment, and remove it so the tracee never sees it.
pub fn take_debug_flag() -> bool {
    let debug = env::var_os(DEBUG_ENV).is_some();
    env::remove_var(DEBUG_ENV);
    debug
}
