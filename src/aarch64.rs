use nix::errno::Errno;

use crate::error::{Result, ResultExt};
use crate::ptracer::Pid;

#[cfg(any(target_os = "android", target_env = "musl"))]
pub(crate) const PTRACE_GETREGSET: i32 = 0x4204;

#[cfg(not(any(target_os = "android", target_env = "musl")))]
pub(crate) const PTRACE_GETREGSET: u32 = 0x4204;

/// Linux constant defined in `include/uapi/linux/elf.h`.
const NT_PRSTATUS: usize = 0x1;

/// General register holding the syscall number on entry (`x8`).
pub(crate) const SYSCALL_NR_REGISTER: usize = 8;

/// Defined in [`arch/arm64/include/uapi/asm/ptrace.h`](https://android.googlesource.com/kernel/common/+/refs/heads/android-mainline/arch/arm64/include/uapi/asm/ptrace.h#88).
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct user_pt_regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64
}

impl user_pt_regs {
    pub fn new() -> Self {
        Self {
            regs: [0; 31],
            sp: 0,
            pc: 0,
            pstate: 0,
        }
    }
}

/// Fetch the `NT_PRSTATUS` register set of a stopped tracee.
pub(crate) fn registers(pid: Pid) -> Result<user_pt_regs> {
    let mut regs = user_pt_regs::new();
    let mut rv = libc::iovec {
        iov_base: &mut regs as *mut _ as *mut libc::c_void,
        iov_len: std::mem::size_of::<user_pt_regs>(),
    };

    let res = unsafe {
        libc::ptrace(
            PTRACE_GETREGSET,
            pid.as_raw(),
            NT_PRSTATUS as *mut libc::c_void,
            &mut rv as *mut _ as *mut libc::c_void,
        )
    };

    Errno::result(res).died_if_esrch(pid)?;

    Ok(regs)
}
