//! Dispatching tracee stops, following new children, and counting syscalls.

use std::ptr;

use nix::{errno::Errno, sys::ptrace};
use tracing::{debug, info, trace, warn};

use crate::cmd::{self, Command};
use crate::counts::SyscallCounts;
use crate::error::{Error, Result, ResultExt};
use crate::regs::RegisterReader;
use crate::status::{ChildKind, Event};
use crate::table::SyscallTable;
use crate::tracee::{Boundary, Tracees};

pub use nix::unistd::Pid;

/// POSIX signal.
pub use nix::sys::signal::Signal;

/// The tracing primitives the dispatcher is built on.
///
/// Every primitive reports failure explicitly. Whether a failure is fatal is up to the
/// caller.
pub trait Ptrace {
    /// Block until some tracee changes state, and return its pid and raw `wait(2)` status.
    ///
    /// Returns `None` if there is nothing left to wait on.
    fn wait(&mut self) -> Result<Option<(Pid, i32)>>;

    /// Resume a stopped tracee until its next syscall-stop, delivering `signal` if it is
    /// nonzero.
    fn restart(&mut self, pid: Pid, signal: i32) -> Result<()>;

    /// Fetch the `PTRACE_GETEVENTMSG` word of a tracee in ptrace-event-stop.
    fn event_message(&mut self, pid: Pid) -> Result<u64>;

    /// Number of the syscall the stopped tracee most recently entered.
    fn syscall_number(&mut self, pid: Pid) -> Result<u64>;
}

/// [`Ptrace`] primitives backed by the running kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Kernel {
    reader: RegisterReader,
}

impl Kernel {
    pub fn new(reader: RegisterReader) -> Self {
        Self { reader }
    }

    /// Kernel primitives using the register layout of the compile target.
    pub fn native() -> Result<Self> {
        RegisterReader::native()
            .map(Self::new)
            .ok_or(Error::Unsupported)
    }
}

impl Ptrace for Kernel {
    fn wait(&mut self) -> Result<Option<(Pid, i32)>> {
        let mut status = 0;

        loop {
            let res = unsafe { libc::waitpid(-1, &mut status, libc::__WALL) };

            match Errno::result(res) {
                Ok(pid) => {
                    return Ok(Some((Pid::from_raw(pid), status)));
                },
                Err(Errno::EINTR) => {
                    continue;
                },
                Err(Errno::ECHILD) => {
                    // No more children to wait on.
                    return Ok(None);
                },
                Err(err) => {
                    return Err(err.into());
                },
            }
        }
    }

    fn restart(&mut self, pid: Pid, signal: i32) -> Result<()> {
        restart_syscall(pid, signal)
    }

    fn event_message(&mut self, pid: Pid) -> Result<u64> {
        let msg = ptrace::getevent(pid).died_if_esrch(pid)?;
        Ok(msg as u64)
    }

    fn syscall_number(&mut self, pid: Pid) -> Result<u64> {
        self.reader.syscall_number(pid)
    }
}

/// Issue `PTRACE_SYSCALL` for `pid`, delivering `signal` if it is nonzero.
///
/// Takes a raw signal number so realtime signals can be passed through.
pub fn restart_syscall(pid: Pid, signal: i32) -> Result<()> {
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_SYSCALL,
            pid.as_raw(),
            ptr::null_mut::<libc::c_void>(),
            signal as libc::c_long as *mut libc::c_void,
        )
    };

    Errno::result(res).died_if_esrch(pid)?;

    Ok(())
}

/// Whether the dispatcher loop should keep going.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Progress {
    Running,
    Finished,
}

/// Run context for one trace: the tracee registry and the syscall counts it feeds.
///
/// Single-threaded. Each event is handled to completion before the next `wait()`, so
/// nothing here needs synchronization.
pub struct Tracer<'t, P> {
    ptrace: P,

    /// The spawned tracee. Its termination ends the run.
    root: Pid,

    tracees: Tracees,
    counts: SyscallCounts,
    table: &'t SyscallTable,
}

impl<'t, P: Ptrace> Tracer<'t, P> {
    pub fn new(ptrace: P, root: Pid, table: &'t SyscallTable) -> Self {
        let mut tracees = Tracees::new();
        tracees.register(root);

        let counts = SyscallCounts::new(table.len());

        Self { ptrace, root, tracees, counts, table }
    }

    pub fn root(&self) -> Pid {
        self.root
    }

    pub fn tracees(&self) -> &Tracees {
        &self.tracees
    }

    pub fn counts(&self) -> &SyscallCounts {
        &self.counts
    }

    pub fn ptrace(&self) -> &P {
        &self.ptrace
    }

    /// Dispatch events until the root tracee terminates, then return the counts.
    pub fn run(mut self) -> Result<SyscallCounts> {
        while self.step()? == Progress::Running {}

        info!(total = self.counts.total(), "tracing finished");

        Ok(self.counts)
    }

    /// Wait for and handle exactly one event.
    pub fn step(&mut self) -> Result<Progress> {
        let (pid, status) = match self.ptrace.wait()? {
            Some(next) => next,
            None => {
                warn!(root = self.root.as_raw(), "no tracees left before root exit was seen");
                return Ok(Progress::Finished);
            },
        };

        let event = Event::decode(status);
        trace!(pid = pid.as_raw(), status, ?event, "tracee changed state");

        let mut signal = 0;

        match event {
            Event::SyscallBoundary => {
                self.on_syscall_stop(pid);
            },
            Event::NewChild { kind } => {
                self.tracees.register(pid);
                self.on_new_child(pid, kind);
            },
            Event::GroupStop => {
                // May be the first stop of an auto-attached child.
                self.tracees.register(pid);
            },
            Event::SignalDelivery { signal: pending } => {
                self.tracees.register(pid);

                debug!(pid = pid.as_raw(), signal = pending, "injecting signal");
                signal = pending;
            },
            Event::Exited { .. } | Event::Signaled { .. } => {
                return Ok(self.on_terminated(pid, event));
            },
        }

        if let Err(err) = self.ptrace.restart(pid, signal) {
            if err.tracee_died() {
                debug!(pid = pid.as_raw(), "tracee died before it could be restarted");
            } else {
                debug!(pid = pid.as_raw(), %err, "could not restart tracee");
            }
        }

        Ok(Progress::Running)
    }

    fn on_syscall_stop(&mut self, pid: Pid) {
        let boundary = self.tracees.register(pid).syscall_stop();

        // Each syscall is counted on entry only.
        if boundary == Boundary::Exit {
            return;
        }

        match self.ptrace.syscall_number(pid) {
            Ok(nr) if self.counts.increment(nr) => {
                let name = self.table.name(nr).unwrap_or("?");
                debug!(pid = pid.as_raw(), nr, "{}()", name);
            },
            Ok(nr) => {
                debug!(pid = pid.as_raw(), nr, "syscall number out of table range");
            },
            Err(err) => {
                debug!(pid = pid.as_raw(), %err, "could not read syscall number");
            },
        }
    }

    fn on_new_child(&mut self, pid: Pid, kind: ChildKind) {
        let new = match self.ptrace.event_message(pid) {
            Ok(msg) => Pid::from_raw(msg as u32 as i32),
            Err(err) => {
                debug!(pid = pid.as_raw(), ?kind, %err, "could not read new child pid");
                return;
            },
        };

        self.tracees.register(new);

        // The child may not have reached its first stop yet. It is restarted again when
        // that stop is reported.
        if let Err(err) = self.ptrace.restart(new, 0) {
            debug!(pid = new.as_raw(), %err, "could not arm new tracee");
        }

        debug!(parent = pid.as_raw(), child = new.as_raw(), ?kind, "tracing new child");
    }

    fn on_terminated(&mut self, pid: Pid, event: Event) -> Progress {
        self.tracees.remove(pid);

        if pid != self.root {
            debug!(pid = pid.as_raw(), ?event, "child tracee terminated");
            return Progress::Running;
        }

        info!(pid = pid.as_raw(), ?event, "root tracee terminated");

        // Children outliving the root are neither detached nor reaped.
        if !self.tracees.is_empty() {
            let pids: Vec<i32> = self.tracees.pids().map(Pid::as_raw).collect();
            warn!(count = pids.len(), ?pids, "tracees still running after root exit");
        }

        Progress::Finished
    }
}

/// Outcome of tracing a command to completion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Trace {
    pub root: Pid,
    pub counts: SyscallCounts,
}

/// Spawn `cmd`, seize it, and trace it and all of its descendants until it terminates.
pub fn trace_command(cmd: Command, table: &SyscallTable) -> Result<Trace> {
    let kernel = Kernel::native()?;

    let root = cmd.spawn()?;
    cmd::seize(root)?;

    let counts = Tracer::new(kernel, root, table).run()?;

    Ok(Trace { root, counts })
}
