//! Decoding of raw `wait(2)` statuses into tracing events.
//!
//! This is the only place that looks at status bits. Everything downstream matches on
//! [`Event`].

/// Set in the stop signal of syscall-stops when `PTRACE_O_TRACESYSGOOD` is in effect.
const SYSCALL_TRAP_MARKER: i32 = 0x80;

/// Defined in `linux/ptrace.h`, which collides with the libc headers on some C runtimes,
/// so it is not reliably exported.
const PTRACE_EVENT_STOP: i32 = 128;

/// How a new tracee came to be.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildKind {
    Fork,
    Vfork,
    Clone,
}

/// A tracee state change, as reported by `wait(2)`.
///
/// Signals are raw numbers, since realtime signals have no [`Signal`](crate::Signal)
/// representation but must still be re-injected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Syscall-enter-stop or syscall-exit-stop. The two are indistinguishable here.
    SyscallBoundary,

    /// Fork, vfork, or clone ptrace-event-stop. The new pid is in the event message.
    NewChild { kind: ChildKind },

    /// Stop with nothing to act on, such as a group-stop.
    GroupStop,

    /// Signal-delivery-stop. `signal` must be passed on at restart.
    SignalDelivery { signal: i32 },

    Exited { code: i32 },

    Signaled { signal: i32, core_dumped: bool },
}

impl Event {
    pub fn decode(status: i32) -> Self {
        // The bit layout of `status` is:
        //
        //   31             16 15            8 7 6            0
        //    +---------------+---------------+-+--------------+
        //    |  ptrace event |  code/signal  |c|   sig_no     |
        //    +---------------+---------------+-+--------------+
        //
        // A stop has `status[7:0] == 0x7f`, with the stop signal in `status[15:8]`. Some C
        // runtimes do not count `PTRACE_EVENT_STOP` as a stop in their `WIFSTOPPED()`, so a
        // nonzero event field is also taken to mean a stop.
        let event = ((status as u32) >> 16) as i32;

        if status & 0xff == 0x7f || event != 0 {
            return Self::decode_stop(status, event);
        }

        let sig_no = status & 0x7f;

        if sig_no == 0 {
            let code = (status >> 8) & 0xff;
            Event::Exited { code }
        } else if sig_no != 0x7f {
            let core_dumped = status & 0x80 != 0;
            Event::Signaled { signal: sig_no, core_dumped }
        } else {
            // `WIFCONTINUED()`, which we never request.
            Event::GroupStop
        }
    }

    fn decode_stop(status: i32, event: i32) -> Self {
        let signal = (status >> 8) & 0xff;

        if signal & SYSCALL_TRAP_MARKER != 0 {
            return Event::SyscallBoundary;
        }

        match event {
            0 =>
                Event::SignalDelivery { signal },
            libc::PTRACE_EVENT_FORK if signal == libc::SIGTRAP =>
                Event::NewChild { kind: ChildKind::Fork },
            libc::PTRACE_EVENT_VFORK if signal == libc::SIGTRAP =>
                Event::NewChild { kind: ChildKind::Vfork },
            libc::PTRACE_EVENT_CLONE if signal == libc::SIGTRAP =>
                Event::NewChild { kind: ChildKind::Clone },
            PTRACE_EVENT_STOP =>
                Event::GroupStop,
            // Other ptrace events are never requested, and carry nothing to deliver.
            _ =>
                Event::GroupStop,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Exited { .. } | Event::Signaled { .. })
    }
}
