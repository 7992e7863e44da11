//! Per-process tracing state, and the registry that owns it.

use std::collections::BTreeMap;

use tracing::debug;

use crate::ptracer::Pid;

/// Which side of a syscall a syscall-stop was on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Boundary {
    Entry,
    Exit,
}

/// A traced process.
///
/// Syscall-enter-stops and syscall-exit-stops look the same, so each tracee tracks which
/// one it expects next. A syscall-enter-stop is always followed by its syscall-exit-stop,
/// a ptrace-event-stop, or the tracee's death, so a single flag is enough.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Tracee {
    pid: Pid,
    expecting_exit: bool,
}

impl Tracee {
    pub fn new(pid: Pid) -> Self {
        let expecting_exit = false;

        Self { pid, expecting_exit }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// True iff an odd number of syscall-stops have been seen.
    pub fn expecting_exit(&self) -> bool {
        self.expecting_exit
    }

    /// Record a syscall-stop, returning which boundary it was.
    pub fn syscall_stop(&mut self) -> Boundary {
        let boundary = if self.expecting_exit {
            Boundary::Exit
        } else {
            Boundary::Entry
        };

        self.expecting_exit = !self.expecting_exit;

        boundary
    }
}

/// Known tracees, keyed by pid.
///
/// Every tracee is independent once registered: children are not owned by, or linked to,
/// the tracee that created them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tracees {
    tracees: BTreeMap<i32, Tracee>,
}

impl Tracees {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the tracee for `pid`, registering a fresh one if it is unknown.
    pub fn register(&mut self, pid: Pid) -> &mut Tracee {
        self.tracees.entry(pid.as_raw()).or_insert_with(|| {
            debug!(pid = pid.as_raw(), "registering new tracee");
            Tracee::new(pid)
        })
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Tracee> {
        debug!(pid = pid.as_raw(), "removing tracee");
        self.tracees.remove(&pid.as_raw())
    }

    pub fn get(&self, pid: Pid) -> Option<&Tracee> {
        self.tracees.get(&pid.as_raw())
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.tracees.contains_key(&pid.as_raw())
    }

    pub fn len(&self) -> usize {
        self.tracees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracees.is_empty()
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.tracees.values().map(Tracee::pid)
    }
}
