use std::ffi::NulError;
use std::io;

use nix::errno::Errno;
use nix::sys::wait::WaitStatus;

use crate::ptracer::Pid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not attach to tracee = {pid}")]
    Attach {
        pid: Pid,
        source: nix::Error,
    },

    #[error("Tracee = {pid} did not stop before exec, status = {status:?}")]
    NotStopped { pid: Pid, status: WaitStatus },

    #[error("Tracee died while handling request, pid = {pid}")]
    TraceeDied { pid: Pid, source: nix::Error },

    #[error("Command has no program to execute")]
    NoProgram,

    #[error("Argument contains an interior NUL byte")]
    Nul(#[from] NulError),

    #[error("Tracing is not supported on this architecture")]
    Unsupported,

    #[error("Input/output error")]
    IO(#[from] io::Error),

    #[error("Could not serialize policy")]
    Json(#[from] serde_json::Error),

    #[error("OS error")]
    OS(#[from] nix::Error),
}

impl Error {
    /// True if the error was caused by the tracee disappearing mid-request.
    pub fn tracee_died(&self) -> bool {
        matches!(self, Error::TraceeDied { .. })
    }
}

pub(crate) trait ResultExt<T> {
    /// Classify `ESRCH` from a ptrace request as the death of `pid`.
    fn died_if_esrch(self, pid: Pid) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, nix::Error> {
    fn died_if_esrch(self, pid: Pid) -> Result<T> {
        self.map_err(|source| {
            if source == Errno::ESRCH {
                Error::TraceeDied { pid, source }
            } else {
                Error::OS(source)
            }
        })
    }
}
