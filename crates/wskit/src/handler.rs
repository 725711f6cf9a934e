//! Handling of trapped `mount(2)` calls

use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::time::Duration;

use log::{error, info, warn};
use nix::unistd::Pid;
use wskit_core::{Result, WskitError};
use wskit_fs::MountRelocation;
use wskit_seccomp::{NotificationGuard, NotificationRequest, Reply};

use crate::daemon::PrivilegedDaemon;
use crate::memory::RemoteMemory;

/// Filesystem type served through the privileged daemon
pub const PROC_FSTYPE: &str = "proc";

/// Decoded `mount(2)` arguments. Strings are kept as the raw bytes the
/// caller passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountArgs {
    pub source: OsString,
    pub dest: PathBuf,
    pub fstype: OsString,
    /// Raw flag word as passed in the register
    pub flags: u64,
    /// Address of the filesystem-specific `data` argument, 0 when absent
    pub data_addr: u64,
}

impl MountArgs {
    /// Decode the string arguments. `data` is left unread: its format
    /// depends on the filesystem type.
    pub fn decode(mem: &RemoteMemory, args: &[u64; 6]) -> Result<Self> {
        Ok(Self {
            source: mem.read_string(args[0])?,
            dest: PathBuf::from(mem.read_string(args[1])?),
            fstype: mem.read_string(args[2])?,
            flags: args[3],
            data_addr: args[4],
        })
    }

    /// Read `data` as a string. A null pointer is `None`.
    pub fn read_data(&self, mem: &RemoteMemory) -> Result<Option<OsString>> {
        match self.data_addr {
            0 => Ok(None),
            addr => mem.read_string(addr).map(Some),
        }
    }

    pub fn is_type(&self, fstype: &str) -> bool {
        self.fstype.as_bytes() == fstype.as_bytes()
    }
}

/// Answers trapped mount calls, serving `proc` through the privileged daemon
pub struct MountHandler<D, R> {
    daemon: D,
    relocator: R,
    daemon_timeout: Duration,
    passthrough: Vec<String>,
}

impl<D: PrivilegedDaemon, R: MountRelocation> MountHandler<D, R> {
    pub fn new(daemon: D, relocator: R, daemon_timeout: Duration) -> Self {
        Self {
            daemon,
            relocator,
            daemon_timeout,
            passthrough: Vec::new(),
        }
    }

    /// Filesystem types handed back to the kernel untouched
    pub fn with_passthrough(mut self, fstypes: Vec<String>) -> Self {
        self.passthrough = fstypes;
        self
    }

    /// Handle one trapped mount call.
    ///
    /// Returns `None` when the notification went stale while its arguments
    /// were read; nothing has been done on its behalf and there is nobody
    /// left to answer.
    pub fn handle(
        &mut self,
        req: &NotificationRequest,
        guard: &dyn NotificationGuard,
    ) -> Option<Reply> {
        let decoded = RemoteMemory::open(req.pid)
            .and_then(|mem| MountArgs::decode(&mem, &req.args).map(|args| (mem, args)));
        let (mem, args) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                error!("pid {}: cannot decode mount arguments: {}", req.pid, e);
                return Some(Reply::error(e.errno()));
            }
        };

        if !guard.is_current(req.id) {
            warn!(
                "pid {}: notification {} went stale while reading arguments",
                req.pid, req.id
            );
            return None;
        }

        info!(
            "pid {}: mount source={:?} dest={:?} type={:?} flags={:#x}",
            req.pid, args.source, args.dest, args.fstype, args.flags
        );

        if args.is_type(PROC_FSTYPE) {
            return Some(match self.mount_proc(req, &mem, &args) {
                Ok(()) => Reply::success(),
                Err(e) => {
                    error!(
                        "pid {}: cannot mount proc at {:?}: {}",
                        req.pid, args.dest, e
                    );
                    Reply::error(e.errno())
                }
            });
        }

        if self.passthrough.iter().any(|t| args.is_type(t)) {
            return Some(Reply::continue_syscall());
        }

        let rejected = WskitError::UnsupportedOperation(format!(
            "mount of type {}",
            args.fstype.to_string_lossy()
        ));
        warn!("pid {}: {}", req.pid, rejected);
        Some(Reply::error(rejected.errno()))
    }

    fn mount_proc(
        &mut self,
        req: &NotificationRequest,
        mem: &RemoteMemory,
        args: &MountArgs,
    ) -> Result<()> {
        let data = args.read_data(mem)?;
        info!("pid {}: proc options {:?}", req.pid, data);

        let mount = self.daemon.mount_proc(req.pid, self.daemon_timeout)?;
        self.relocator
            .relocate(Pid::from_raw(req.pid as i32), &mount.location, &args.dest)
            .map_err(|e| match e {
                WskitError::Relocation(_) => e,
                other => WskitError::Relocation(format!(
                    "{} -> {}: {}",
                    mount.location.display(),
                    args.dest.display(),
                    other
                )),
            })
    }
}
