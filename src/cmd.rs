use std::env;
use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;

use nix::{
    sys::{
        ptrace::{self, Options},
        signal::{raise, Signal},
        wait::{self, WaitPidFlag, WaitStatus},
    },
    unistd::{fork, ForkResult, Pid},
};
use tracing::{debug, info};

use crate::config::DEBUG_ENV;
use crate::error::{Error, Result};
use crate::ptracer::restart_syscall;

/// Options set when seizing the root tracee. Auto-attached children inherit them.
pub const SEIZE_OPTIONS: Options = Options::empty()
    .union(Options::PTRACE_O_TRACESYSGOOD)
    .union(Options::PTRACE_O_TRACEFORK)
    .union(Options::PTRACE_O_TRACEVFORK)
    .union(Options::PTRACE_O_TRACECLONE);

/// Command to spawn as a child process to be traced.
#[derive(Clone, Debug)]
pub struct Command {
    /// Argument vector to pass to `execve()`. The program is not searched for in `PATH`.
    argv: Vec<CString>,

    /// Environment to pass to `execve()`, as `KEY=VALUE` entries.
    ///
    /// Inherited from the tracer, minus the debug variable.
    env: Vec<CString>,
}

impl Command {
    pub fn new(argv: Vec<impl Into<Vec<u8>>>) -> Result<Self> {
        if argv.is_empty() {
            return Err(Error::NoProgram);
        }

        // Ensure we own NUL-terminated strings for the foreign exec call.
        //
        // We're heap-allocating, so always do this before forking.
        let argv: std::result::Result<Vec<_>, _> = argv
            .into_iter()
            .map(CString::new)
            .collect();
        let argv = argv?;

        let env = inherited_env()?;

        Ok(Self { argv, env })
    }

    /// Prepend `LD_PRELOAD=<lib>` to the environment of the spawned program.
    pub fn preload(mut self, lib: impl Into<Vec<u8>>) -> Result<Self> {
        let mut var = b"LD_PRELOAD=".to_vec();
        var.extend(lib.into());

        self.env.insert(0, CString::new(var)?);

        Ok(self)
    }

    pub fn program(&self) -> &CStr {
        &self.argv[0]
    }

    pub fn env(&self) -> &[CString] {
        &self.env
    }

    /// Fork and exec a child process determined by `self.argv`.
    ///
    /// The child raises `SIGSTOP` before `execve()`, so the parent can [`seize()`] it without
    /// missing any of the program's syscalls.
    pub fn spawn(&self) -> Result<Pid> {
        // Heap-allocates, must occur pre-fork.
        let argv = nul_terminated(&self.argv);
        let envp = nul_terminated(&self.env);
        let exec_failed = format!("utrace: failed to exec {}\n", self.program().to_string_lossy());

        match unsafe { fork() }? {
            ForkResult::Child => {
                // Only async-signal-safe calls from here on: the child may have been forked
                // from a multithreaded parent.
                if raise(Signal::SIGSTOP).is_err() {
                    unsafe { libc::_exit(126) };
                }

                unsafe {
                    libc::execve(argv[0], argv.as_ptr(), envp.as_ptr());

                    libc::write(
                        libc::STDERR_FILENO,
                        exec_failed.as_ptr() as *const libc::c_void,
                        exec_failed.len(),
                    );
                    libc::_exit(127)
                }
            },
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), "spawned tracee");
                Ok(child)
            },
        }
    }
}

/// Wait for a freshly-spawned child to stop, seize it, and let it run to its first
/// syscall-stop.
pub fn seize(pid: Pid) -> Result<()> {
    match wait::waitpid(pid, Some(WaitPidFlag::WUNTRACED)) {
        Ok(WaitStatus::Stopped(..)) => {},
        Ok(status) => {
            return Err(Error::NotStopped { pid, status });
        },
        Err(source) => {
            return Err(Error::Attach { pid, source });
        },
    }

    ptrace::seize(pid, SEIZE_OPTIONS).map_err(|source| Error::Attach { pid, source })?;
    info!(pid = pid.as_raw(), "seized tracee");

    // A failure here is not fatal: the tracee is still seized, and its next stop will be
    // reported to the dispatcher, which restarts it.
    if let Err(err) = restart_syscall(pid, libc::SIGCONT) {
        debug!(pid = pid.as_raw(), %err, "could not resume seized tracee");
    }

    Ok(())
}

fn inherited_env() -> Result<Vec<CString>> {
    let mut env = vec![];

    for (key, value) in env::vars_os() {
        if key.as_os_str() == OsStr::new(DEBUG_ENV) {
            continue;
        }

        let mut var = key.as_bytes().to_vec();
        var.push(b'=');
        var.extend_from_slice(value.as_bytes());

        env.push(CString::new(var)?);
    }

    Ok(env)
}

// Construct a NUL-terminated pointer array for `execve()`. We heap-allocate to return a
// `Vec`, and so must do this before calling `fork()`.
fn nul_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    let mut ptrs: Vec<_> = strings
        .iter()
        .map(|s| s.as_ptr())
        .collect();
    ptrs.push(std::ptr::null());
    ptrs
}
