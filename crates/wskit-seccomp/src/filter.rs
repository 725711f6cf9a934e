//! Notify filter compilation and installation
//!
//! The filter traps the listed syscalls to a user-space listener and allows
//! everything else. Any stricter policy is expected to be stacked separately.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd};

use wskit_core::{Result, WskitError};

const SECCOMP_SET_MODE_FILTER: libc::c_ulong = 1;
const SECCOMP_FILTER_FLAG_NEW_LISTENER: libc::c_ulong = 1 << 3;

const SECCOMP_RET_USER_NOTIF: u32 = 0x7fc0_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

const OFFSET_SYSCALL_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;

#[cfg(target_arch = "x86_64")]
const AUDIT_ARCH_NATIVE: u32 = 0xc000_003e;
#[cfg(target_arch = "aarch64")]
const AUDIT_ARCH_NATIVE: u32 = 0xc000_00b7;

/// Jump offsets are u8
const MAX_TRAPPED_SYSCALLS: usize = 200;

/// Mirrors kernel `struct sock_filter`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl SockFilter {
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self { code, jt: 0, jf: 0, k }
    }

    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

#[repr(C)]
struct SockFprog {
    len: u16,
    filter: *const SockFilter,
}

/// Build a filter that returns `SECCOMP_RET_USER_NOTIF` for `syscalls` and
/// `SECCOMP_RET_ALLOW` for everything else, including foreign architectures.
pub fn build_notify_filter(syscalls: &[libc::c_long]) -> Result<Vec<SockFilter>> {
    if syscalls.is_empty() {
        return Err(WskitError::Seccomp(
            "notify filter needs at least one syscall".to_string(),
        ));
    }
    if syscalls.len() > MAX_TRAPPED_SYSCALLS {
        return Err(WskitError::Seccomp(format!(
            "too many trapped syscalls: {} > {}",
            syscalls.len(),
            MAX_TRAPPED_SYSCALLS
        )));
    }

    let n = syscalls.len();
    let mut filter = Vec::with_capacity(n + 6);

    filter.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH));
    filter.push(SockFilter::jump(
        BPF_JMP | BPF_JEQ | BPF_K,
        AUDIT_ARCH_NATIVE,
        1,
        0,
    ));
    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));

    filter.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_SYSCALL_NR));
    for (i, &nr) in syscalls.iter().enumerate() {
        let to_notify = (n - i) as u8;
        filter.push(SockFilter::jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            nr as u32,
            to_notify,
            0,
        ));
    }

    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_USER_NOTIF));

    Ok(filter)
}

/// Install `filter` on the calling thread and return the listener fd.
///
/// Sets `PR_SET_NO_NEW_PRIVS` first, so no root is needed. The filter is
/// permanent and inherited across fork and exec.
pub fn install_notify_filter(filter: &[SockFilter]) -> Result<OwnedFd> {
    let len = u16::try_from(filter.len())
        .map_err(|_| WskitError::Seccomp(format!("filter too long: {}", filter.len())))?;
    let prog = SockFprog {
        len,
        filter: filter.as_ptr(),
    };

    unsafe {
        if libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) != 0 {
            return Err(WskitError::Seccomp(format!(
                "Failed to set PR_SET_NO_NEW_PRIVS: {}",
                io::Error::last_os_error()
            )));
        }

        let ret = libc::syscall(
            libc::SYS_seccomp,
            SECCOMP_SET_MODE_FILTER,
            SECCOMP_FILTER_FLAG_NEW_LISTENER,
            &prog as *const SockFprog,
        );
        if ret < 0 {
            return Err(WskitError::Seccomp(format!(
                "Failed to install notify filter: {}",
                io::Error::last_os_error()
            )));
        }
        // SAFETY: on success the kernel returns a fresh listener fd
        Ok(OwnedFd::from_raw_fd(ret as i32))
    }
}
