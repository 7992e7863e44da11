/// Return the offset of `regs.orig_rax` in the virtual x86-64 `user` struct.
///
/// The kernel saves the number of the syscall being entered there, and leaves it in place
/// until the syscall-exit-stop.
#[cfg(target_arch = "x86_64")]
pub(crate) fn orig_rax_offset() -> u64 {
    let regs = memoffset::offset_of!(libc::user, regs);
    let orig_rax = memoffset::offset_of!(libc::user_regs_struct, orig_rax);

    (regs + orig_rax) as u64
}

// `regs` leads `struct user`, and `orig_rax` is its 16th 64-bit word.
#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn orig_rax_offset() -> u64 {
    15 * 8
}

/// Offset of `regs.orig_eax` in the i386 `user` struct: the 12th 32-bit word of `regs`.
pub(crate) const ORIG_EAX_OFFSET: u64 = 11 * 4;
