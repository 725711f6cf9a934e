//! wskit-seccomp: seccomp user notification plumbing
//!
//! - **notify**: kernel ABI structs, the request and reply types
//! - **listener**: receive/answer notifications on a listener fd
//! - **filter**: build and install a filter that traps selected syscalls
//! - **scm_rights**: hand the listener fd to the interceptor process

pub mod filter;
pub mod listener;
pub mod notify;
pub mod scm_rights;

pub use filter::{build_notify_filter, install_notify_filter, SockFilter};
pub use listener::{NotificationGuard, NotifyListener, Readiness};
pub use notify::{NotificationRequest, Reply};
pub use scm_rights::{recv_fd, send_fd};
