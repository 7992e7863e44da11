//! Turning the syscall counts of a finished run into a whitelist.

use std::cmp::Reverse;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::counts::SyscallCounts;
use crate::error::Result;
use crate::table::SyscallTable;

/// Policy id used when none is given.
pub const DEFAULT_POLICY: i32 = libc::EPERM;

/// Syscalls any sandboxed program needs for signal handling and teardown.
///
/// Always whitelisted with a count of exactly 1, however often they were seen: the tracer
/// can miss them when they race with process exit. Names the target architecture does
/// not have are skipped.
pub const MANDATORY_SYSCALLS: &[&str] = &[
    "rt_sigaction",
    "sigreturn",
    "rt_sigreturn",
    "exit_group",
    "exit",
];

/// Whitelist of syscall names, most frequently called first, with the id of the policy
/// it is meant for.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub whitelist: Vec<String>,
    pub policy: i32,
}

/// Where a [`Policy`] was written.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Destination {
    File(PathBuf),
    Stdout,
}

impl Policy {
    /// Build the whitelist from the final counts of a run.
    pub fn emit(mut counts: SyscallCounts, table: &SyscallTable, policy: i32) -> Self {
        for name in MANDATORY_SYSCALLS {
            if let Some(nr) = table.number(name) {
                counts.set(nr, 1);
            }
        }

        // Ties, including all the zero counts, go to the lower syscall number, so that
        // output is reproducible across runs.
        let mut ranked: Vec<(u64, u64)> = counts.iter().collect();
        ranked.sort_by_key(|&(nr, count)| (Reverse(count), nr));

        let mut whitelist = vec![];

        for (nr, count) in ranked.into_iter().take_while(|&(_, count)| count > 0) {
            match table.name(nr) {
                Some(name) => {
                    debug!(nr, count, "syscall {} was called {} times", name, count);
                    whitelist.push(name.to_owned());
                },
                None => {
                    error!(nr, "no name found for syscall");
                },
            }
        }

        Self { whitelist, policy }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }

    /// Write the policy to `path`, or to stdout if there is no path or the file cannot be
    /// created.
    pub fn save(&self, path: Option<&Path>) -> Result<Destination> {
        if let Some(path) = path {
            match File::create(path) {
                Ok(file) => {
                    self.write_json(file)?;
                    info!("saving syscall trace to {}", path.display());

                    return Ok(Destination::File(path.to_owned()));
                },
                Err(err) => {
                    warn!(%err, "failed to open {}, writing to stdout", path.display());
                },
            }
        }

        let stdout = io::stdout();
        self.write_json(stdout.lock())?;

        Ok(Destination::Stdout)
    }
}
