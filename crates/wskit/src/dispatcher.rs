//! Notification dispatch loop

use log::{debug, info, warn};
use wskit_core::{InterceptorConfig, Result};
use wskit_fs::{MountRelocation, Relocator};
use wskit_namespace::NamespaceRunner;
use wskit_seccomp::{NotificationRequest, NotifyListener, Readiness, Reply};

use crate::daemon::{PrivilegedDaemon, UnixDaemonClient};
use crate::handler::MountHandler;

/// Syscalls the dispatcher has a handler for
pub const HANDLED_SYSCALLS: &[libc::c_long] = &[libc::SYS_mount];

/// Counters kept over one dispatch loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub answered: u64,
    pub stale: u64,
}

/// Receives notifications from one listener and answers each exactly once
pub struct Dispatcher<D, R> {
    listener: NotifyListener,
    mount: MountHandler<D, R>,
    stats: DispatchStats,
}

impl Dispatcher<UnixDaemonClient, Relocator> {
    /// Wire the daemon client and relocator described by `config`
    pub fn from_config(listener: NotifyListener, config: &InterceptorConfig) -> Result<Self> {
        config.validate()?;
        let runner = NamespaceRunner::new(config.helper_timeout);
        let relocator = Relocator::new(config.relocation.clone(), runner);
        let daemon = UnixDaemonClient::new(&config.daemon_socket);
        let mount = MountHandler::new(daemon, relocator, config.daemon_timeout)
            .with_passthrough(config.passthrough_fstypes.clone());
        info!(
            "dispatcher ready: daemon={} relocation={}",
            config.daemon_socket.display(),
            config.relocation.name()
        );
        Ok(Self::new(listener, mount))
    }
}

impl<D: PrivilegedDaemon, R: MountRelocation> Dispatcher<D, R> {
    pub fn new(listener: NotifyListener, mount: MountHandler<D, R>) -> Self {
        Self {
            listener,
            mount,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Serve notifications until no filtered task remains
    pub fn run(&mut self) -> Result<DispatchStats> {
        loop {
            if self.listener.wait()? == Readiness::HungUp {
                info!(
                    "listener hung up after {} notifications",
                    self.stats.received
                );
                return Ok(self.stats);
            }
            let Some(req) = self.listener.recv()? else {
                continue;
            };
            self.stats.received += 1;

            let Some(reply) = self.dispatch(&req) else {
                self.stats.stale += 1;
                continue;
            };
            match self.listener.send(req.id, &reply) {
                Ok(()) => self.stats.answered += 1,
                Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
                    debug!("pid {} gone before reply", req.pid);
                }
                Err(e) => warn!("cannot reply to pid {}: {}", req.pid, e),
            }
        }
    }

    /// Pick the reply for one request; `None` when it went stale
    pub fn dispatch(&mut self, req: &NotificationRequest) -> Option<Reply> {
        if req.is_syscall(libc::SYS_mount) {
            return self.mount.handle(req, &self.listener);
        }
        debug!(
            "pid {}: no handler for syscall {}, continuing",
            req.pid, req.syscall_nr
        );
        Some(Reply::continue_syscall())
    }
}
