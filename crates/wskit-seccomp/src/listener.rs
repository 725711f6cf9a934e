//! Seccomp listener fd wrapper

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use log::trace;
use wskit_core::{Result, WskitError};

use crate::notify::{
    NotificationRequest, Reply, SeccompNotif, SECCOMP_IOCTL_NOTIF_ID_VALID,
    SECCOMP_IOCTL_NOTIF_RECV, SECCOMP_IOCTL_NOTIF_SEND,
};

/// Checks that a notification is still pending.
///
/// Memory read from the target between receive and reply may belong to a
/// different process if the target died and its pid was reused, so handlers
/// re-check the id after reading.
pub trait NotificationGuard {
    fn is_current(&self, id: u64) -> bool;
}

/// State of the listener after waiting on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A notification can be received
    Ready,
    /// No filtered task remains; nothing will ever arrive
    HungUp,
}

/// Owner of a seccomp listener fd.
pub struct NotifyListener {
    fd: OwnedFd,
}

impl NotifyListener {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Block until a notification is pending or all filtered tasks are gone.
    pub fn wait(&self) -> Result<Readiness> {
        loop {
            let mut pfd = libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let ret = unsafe { libc::poll(&mut pfd, 1, -1) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(WskitError::Seccomp(format!("poll on listener failed: {}", err)));
            }
            if pfd.revents & libc::POLLIN != 0 {
                return Ok(Readiness::Ready);
            }
            if pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
                return Ok(Readiness::HungUp);
            }
        }
    }

    /// Receive the next notification.
    ///
    /// Returns `None` when the trapped task died before it could be received
    /// or the call was interrupted.
    pub fn recv(&self) -> Result<Option<NotificationRequest>> {
        // the kernel requires a zeroed buffer
        let mut notif = SeccompNotif::default();
        let ret = unsafe {
            libc::ioctl(
                self.fd.as_raw_fd(),
                SECCOMP_IOCTL_NOTIF_RECV as _,
                &mut notif as *mut SeccompNotif,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::ENOENT) | Some(libc::EINTR) => {
                    trace!("notification vanished before receive: {}", err);
                    Ok(None)
                }
                _ => Err(WskitError::Seccomp(format!(
                    "cannot receive notification: {}",
                    err
                ))),
            };
        }
        Ok(Some(NotificationRequest::from(&notif)))
    }

    /// Answer a notification, resuming the trapped thread.
    ///
    /// Fails with `ENOENT` when the target is gone.
    pub fn send(&self, id: u64, reply: &Reply) -> io::Result<()> {
        let resp = reply.to_response(id);
        let ret = unsafe {
            libc::ioctl(
                self.fd.as_raw_fd(),
                SECCOMP_IOCTL_NOTIF_SEND as _,
                &resp as *const _,
            )
        };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    pub fn id_valid(&self, id: u64) -> bool {
        let ret = unsafe {
            libc::ioctl(
                self.fd.as_raw_fd(),
                SECCOMP_IOCTL_NOTIF_ID_VALID as _,
                &id as *const u64,
            )
        };
        ret == 0
    }
}

impl NotificationGuard for NotifyListener {
    fn is_current(&self, id: u64) -> bool {
        self.id_valid(id)
    }
}
