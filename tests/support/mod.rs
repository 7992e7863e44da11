#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};

use nix::errno::Errno;
use utrace::{Error, Pid, Progress, Ptrace, Result, Tracer};

#[allow(unused)]
macro_rules! pid {
    ($raw: expr) => {
        utrace::Pid::from_raw($raw)
    };
}

/// Raw `wait(2)` statuses, encoded the way the kernel reports them.
pub mod status {
    /// Ptrace event code of a seized tracee's group-stop or listen-stop.
    pub const PTRACE_EVENT_STOP: i32 = 128;

    pub fn syscall_stop() -> i32 {
        0x7f | ((libc::SIGTRAP | 0x80) << 8)
    }

    pub fn event_stop(event: i32) -> i32 {
        0x7f | (libc::SIGTRAP << 8) | (event << 16)
    }

    pub fn group_stop(signal: i32) -> i32 {
        0x7f | (signal << 8) | (PTRACE_EVENT_STOP << 16)
    }

    pub fn signal_stop(signal: i32) -> i32 {
        0x7f | (signal << 8)
    }

    pub fn exited(code: i32) -> i32 {
        (code & 0xff) << 8
    }

    pub fn killed(signal: i32, core_dumped: bool) -> i32 {
        let core = if core_dumped { 0x80 } else { 0 };
        (signal & 0x7f) | core
    }
}

/// Scripted [`Ptrace`] backend: replays a fixed sequence of wait statuses and records how
/// the dispatcher responds.
#[derive(Debug, Default)]
pub struct Script {
    events: VecDeque<(Pid, i32)>,

    /// Syscall numbers to report on each register read, per tracee. `None` fails the read.
    syscalls: HashMap<Pid, VecDeque<Option<u64>>>,

    /// New child pids to report on each event message read, per tracee.
    children: HashMap<Pid, VecDeque<u64>>,

    /// Tracees whose restart fails as if they had been killed.
    dead: HashSet<Pid>,

    pub restarts: Vec<(Pid, i32)>,
    pub reads: Vec<Pid>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(mut self, raw_pid: i32, status: i32) -> Self {
        self.events.push_back((Pid::from_raw(raw_pid), status));
        self
    }

    /// Syscall-enter-stop, with `nr` in the syscall number register.
    pub fn entry(mut self, raw_pid: i32, nr: u64) -> Self {
        let pid = Pid::from_raw(raw_pid);
        self.syscalls.entry(pid).or_default().push_back(Some(nr));
        self.stop(raw_pid, status::syscall_stop())
    }

    /// Syscall-enter-stop whose register read fails.
    pub fn unreadable_entry(mut self, raw_pid: i32) -> Self {
        let pid = Pid::from_raw(raw_pid);
        self.syscalls.entry(pid).or_default().push_back(None);
        self.stop(raw_pid, status::syscall_stop())
    }

    pub fn exit(self, raw_pid: i32) -> Self {
        self.stop(raw_pid, status::syscall_stop())
    }

    /// A complete syscall: enter-stop, then exit-stop.
    pub fn call(self, raw_pid: i32, nr: u64) -> Self {
        self.entry(raw_pid, nr).exit(raw_pid)
    }

    pub fn new_child(mut self, raw_pid: i32, event: i32, raw_child: i32) -> Self {
        let pid = Pid::from_raw(raw_pid);
        self.children.entry(pid).or_default().push_back(raw_child as u64);
        self.stop(raw_pid, status::event_stop(event))
    }

    pub fn fork(self, raw_pid: i32, raw_child: i32) -> Self {
        self.new_child(raw_pid, libc::PTRACE_EVENT_FORK, raw_child)
    }

    pub fn exited(self, raw_pid: i32, code: i32) -> Self {
        self.stop(raw_pid, status::exited(code))
    }

    pub fn dead(mut self, raw_pid: i32) -> Self {
        self.dead.insert(Pid::from_raw(raw_pid));
        self
    }

    /// Events not yet consumed by `wait()`.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Signals passed at each restart of `pid`, in order.
    pub fn restarts_of(&self, raw_pid: i32) -> Vec<i32> {
        let pid = Pid::from_raw(raw_pid);

        self.restarts
            .iter()
            .filter(|(restarted, _)| *restarted == pid)
            .map(|(_, signal)| *signal)
            .collect()
    }
}

impl Ptrace for Script {
    fn wait(&mut self) -> Result<Option<(Pid, i32)>> {
        Ok(self.events.pop_front())
    }

    fn restart(&mut self, pid: Pid, signal: i32) -> Result<()> {
        self.restarts.push((pid, signal));

        if self.dead.contains(&pid) {
            return Err(Error::TraceeDied { pid, source: Errno::ESRCH });
        }

        Ok(())
    }

    fn event_message(&mut self, pid: Pid) -> Result<u64> {
        self.children
            .get_mut(&pid)
            .and_then(VecDeque::pop_front)
            .ok_or(Error::TraceeDied { pid, source: Errno::ESRCH })
    }

    fn syscall_number(&mut self, pid: Pid) -> Result<u64> {
        self.reads.push(pid);

        self.syscalls
            .get_mut(&pid)
            .and_then(VecDeque::pop_front)
            .flatten()
            .ok_or(Error::TraceeDied { pid, source: Errno::ESRCH })
    }
}

/// Step `tracer` until it reports that the run is finished.
pub fn run_to_end(tracer: &mut Tracer<'_, Script>) -> Result<()> {
    while tracer.step()? == Progress::Running {}
    Ok(())
}
