//! Seccomp user notification (`SECCOMP_RET_USER_NOTIF`) kernel ABI.
//!
//! A filter returning `SECCOMP_RET_USER_NOTIF` suspends the calling thread and
//! queues a `struct seccomp_notif` on the listener fd. The supervisor reads it
//! with `SECCOMP_IOCTL_NOTIF_RECV` and must answer with exactly one
//! `struct seccomp_notif_resp` through `SECCOMP_IOCTL_NOTIF_SEND`, otherwise
//! the thread stays blocked.
//!
//! The ioctl numbers use the generic `_IOC` encoding and are the same on
//! x86_64 and aarch64.

/// Let the syscall proceed as-is.
pub const SECCOMP_USER_NOTIF_FLAG_CONTINUE: u32 = 1;

/// `SECCOMP_IOWR(0, struct seccomp_notif)`
pub const SECCOMP_IOCTL_NOTIF_RECV: u64 = 0xc0502100;
/// `SECCOMP_IOWR(1, struct seccomp_notif_resp)`
pub const SECCOMP_IOCTL_NOTIF_SEND: u64 = 0xc0182101;
/// `SECCOMP_IOW(2, __u64)`
pub const SECCOMP_IOCTL_NOTIF_ID_VALID: u64 = 0x40082102;

/// Mirrors kernel `struct seccomp_data`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompData {
    pub nr: i32,
    pub arch: u32,
    pub instruction_pointer: u64,
    pub args: [u64; 6],
}

/// Mirrors kernel `struct seccomp_notif`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompNotif {
    pub id: u64,
    /// PID of the trapped thread, in the listener owner's PID namespace
    pub pid: u32,
    pub flags: u32,
    pub data: SeccompData,
}

/// Mirrors kernel `struct seccomp_notif_resp`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompNotifResp {
    pub id: u64,
    pub val: i64,
    /// Zero or a negative errno
    pub error: i32,
    pub flags: u32,
}

/// One pending syscall trap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    /// Kernel cookie identifying this trap
    pub id: u64,
    /// Process id of the trapped thread
    pub pid: u32,
    pub syscall_nr: i32,
    pub arch: u32,
    /// Raw argument words; pointers are offsets into the target's memory
    pub args: [u64; 6],
}

impl From<&SeccompNotif> for NotificationRequest {
    fn from(notif: &SeccompNotif) -> Self {
        Self {
            id: notif.id,
            pid: notif.pid,
            syscall_nr: notif.data.nr,
            arch: notif.data.arch,
            args: notif.data.args,
        }
    }
}

impl NotificationRequest {
    pub fn is_syscall(&self, nr: libc::c_long) -> bool {
        libc::c_long::from(self.syscall_nr) == nr
    }
}

/// Outcome of one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Syscall return value, used when `errno` is zero
    pub val: i64,
    /// Positive errno, or zero on success
    pub errno: i32,
    /// Let the kernel run the original syscall unmodified
    pub continue_syscall: bool,
}

impl Reply {
    pub fn success() -> Self {
        Self {
            val: 0,
            errno: 0,
            continue_syscall: false,
        }
    }

    pub fn error(errno: i32) -> Self {
        Self {
            val: -1,
            errno,
            continue_syscall: false,
        }
    }

    pub fn continue_syscall() -> Self {
        Self {
            val: 0,
            errno: 0,
            continue_syscall: true,
        }
    }

    /// Encode for `SECCOMP_IOCTL_NOTIF_SEND`.
    pub fn to_response(&self, id: u64) -> SeccompNotifResp {
        if self.continue_syscall {
            // the kernel rejects CONTINUE with a non-zero val or error
            return SeccompNotifResp {
                id,
                val: 0,
                error: 0,
                flags: SECCOMP_USER_NOTIF_FLAG_CONTINUE,
            };
        }
        SeccompNotifResp {
            id,
            val: if self.errno == 0 { self.val } else { 0 },
            error: -self.errno.abs(),
            flags: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sizes() {
        assert_eq!(std::mem::size_of::<SeccompData>(), 64);
        assert_eq!(std::mem::size_of::<SeccompNotif>(), 80);
        assert_eq!(std::mem::size_of::<SeccompNotifResp>(), 24);
    }

    #[test]
    fn error_reply_is_negated_on_the_wire() {
        let resp = Reply::error(libc::EFAULT).to_response(7);
        assert_eq!(resp.id, 7);
        assert_eq!(resp.error, -libc::EFAULT);
        assert_eq!(resp.flags, 0);
    }

    #[test]
    fn continue_reply_clears_val_and_error() {
        let reply = Reply {
            val: 5,
            errno: libc::EPERM,
            continue_syscall: true,
        };
        let resp = reply.to_response(1);
        assert_eq!(resp.val, 0);
        assert_eq!(resp.error, 0);
        assert_eq!(resp.flags, SECCOMP_USER_NOTIF_FLAG_CONTINUE);
    }

    #[test]
    fn request_from_notif() {
        let mut notif = SeccompNotif::default();
        notif.id = 42;
        notif.pid = 1234;
        notif.data.nr = libc::SYS_mount as i32;
        notif.data.args[1] = 0xdead_beef;

        let req = NotificationRequest::from(&notif);
        assert_eq!(req.id, 42);
        assert_eq!(req.pid, 1234);
        assert!(req.is_syscall(libc::SYS_mount));
        assert_eq!(req.args[1], 0xdead_beef);
    }
}
