//! Recovering the number of the syscall a stopped tracee has entered.

use std::ptr;

use nix::errno::Errno;

use crate::aarch64;
use crate::error::{Result, ResultExt};
use crate::ptracer::Pid;
use crate::x86;

/// `PTRACE_PEEKUSER` on MIPS takes a register index, not a byte offset. `v0` (`$2`)
/// carries the syscall number.
const MIPS_V0: u64 = 2;

/// Offset of `regs.uregs[7]` in the 32-bit ARM `user` struct. EABI passes the syscall
/// number in `r7`.
const ARM_R7_OFFSET: u64 = 7 * 4;

/// Architecture-specific strategy for reading the syscall number from a stopped tracee.
///
/// Exactly one strategy is meaningful for a given build. It is chosen once, via
/// [`RegisterReader::native()`], and handed to the dispatcher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegisterReader {
    /// `PTRACE_PEEKUSER` at `regs.orig_rax`.
    X86_64,

    /// `PTRACE_PEEKUSER` at `regs.orig_eax`.
    X86,

    /// `PTRACE_PEEKUSER` of general register `v0`.
    Mips,

    /// `PTRACE_PEEKUSER` at `regs.uregs[7]`.
    Arm,

    /// `PTRACE_GETREGSET`, then `x8`.
    Aarch64,
}

impl RegisterReader {
    /// Strategy for the compile target, if tracing is supported there.
    pub fn native() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(RegisterReader::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(RegisterReader::X86)
        } else if cfg!(target_arch = "mips") {
            Some(RegisterReader::Mips)
        } else if cfg!(target_arch = "arm") {
            Some(RegisterReader::Arm)
        } else if cfg!(target_arch = "aarch64") {
            Some(RegisterReader::Aarch64)
        } else {
            None
        }
    }

    /// Read the number of the most recently entered syscall of a stopped tracee.
    pub fn syscall_number(self, pid: Pid) -> Result<u64> {
        match self {
            RegisterReader::X86_64 =>
                peek_user(pid, x86::orig_rax_offset()),
            RegisterReader::X86 =>
                peek_user(pid, x86::ORIG_EAX_OFFSET),
            RegisterReader::Mips =>
                peek_user(pid, MIPS_V0),
            RegisterReader::Arm =>
                peek_user(pid, ARM_R7_OFFSET),
            RegisterReader::Aarch64 => {
                let regs = aarch64::registers(pid)?;
                Ok(regs.regs[aarch64::SYSCALL_NR_REGISTER])
            },
        }
    }
}

fn peek_user(pid: Pid, off: u64) -> Result<u64> {
    // The peeked word is the return value, so `-1` is ambiguous until `errno` is checked.
    Errno::clear();

    let data = unsafe {
        libc::ptrace(
            libc::PTRACE_PEEKUSER,
            pid.as_raw(),
            off as usize as *mut libc::c_void,
            ptr::null_mut::<libc::c_void>(),
        )
    };

    if data == -1 {
        let errno = Errno::last();

        if errno != Errno::UnknownErrno {
            return Err::<u64, _>(errno).died_if_esrch(pid);
        }
    }

    Ok(data as u64)
}
