pub mod cmd;
pub mod config;
pub mod counts;
pub mod error;
pub mod policy;
pub mod ptracer;
pub mod regs;
pub mod status;
pub mod table;
pub mod tracee;

mod aarch64;
mod x86;

pub use cmd::Command;
pub use counts::SyscallCounts;
pub use error::{Error, Result};
pub use policy::{Destination, Policy};
pub use ptracer::{trace_command, Kernel, Pid, Progress, Ptrace, Signal, Trace, Tracer};
pub use regs::RegisterReader;
pub use status::{ChildKind, Event};
pub use table::SyscallTable;
pub use tracee::{Boundary, Tracee, Tracees};
