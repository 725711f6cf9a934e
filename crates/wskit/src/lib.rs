//! wskit: serve `mount(2)` for unprivileged workspace containers
//!
//! A workload runs under a seccomp filter that traps `mount`. The interceptor
//! receives each trapped call, reads its arguments out of the caller's memory
//! and either performs it through the privileged daemon or rejects it.
//!
//! # Example
//!
//! ```no_run
//! use wskit::{accept_listener, Dispatcher};
//! use wskit_core::InterceptorConfig;
//!
//! let listener = accept_listener("/run/wskit/listener.sock".as_ref())?;
//! let mut dispatcher = Dispatcher::from_config(listener, &InterceptorConfig::default())?;
//! dispatcher.run()?;
//! # Ok::<(), wskit_core::WskitError>(())
//! ```

pub mod daemon;
pub mod dispatcher;
pub mod handler;
pub mod handoff;
pub mod memory;

pub use daemon::{DaemonError, PrivilegedDaemon, PrivilegedMount, UnixDaemonClient};
pub use dispatcher::{DispatchStats, Dispatcher, HANDLED_SYSCALLS};
pub use handler::{MountArgs, MountHandler, PROC_FSTYPE};
pub use handoff::{accept_listener, receive_listener, trap_and_hand_over};
pub use memory::{RemoteMemory, MAX_STRING_LEN};
