//! Parent side of the namespace entry helper
//!
//! Each run re-executes the current binary as a short-lived child holding
//! descriptors into the target's namespaces, root and working directory.
//! The child enters them and runs one [`Action`]; nothing outlives the call.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::Pid;
use wskit_core::{Result, WskitError};

use crate::action::Action;
use crate::config::NamespaceKind;
use crate::slots::{descriptor_set, DescriptorSpec, SlotTable, FIRST_SLOT};

const SELF_EXE: &str = "/proc/self/exe";
const WAIT_INTERVAL: Duration = Duration::from_millis(5);

/// Opened descriptors are moved above this so they never sit on a target slot
const SLOT_FLOOR: RawFd = FIRST_SLOT + 16;

/// Environment variables forwarded to the helper child
const FORWARDED_ENV: &[&str] = &["RUST_LOG"];

/// Spawns namespace entry helpers
#[derive(Debug, Clone)]
pub struct NamespaceRunner {
    program: PathBuf,
    timeout: Duration,
}

impl NamespaceRunner {
    /// Runner that re-executes the current binary
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from(SELF_EXE),
            timeout,
        }
    }

    /// Use a different helper binary (it must implement the `handler` subcommand)
    pub fn with_program(mut self, program: impl AsRef<Path>) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Enter `namespaces` of `target` (plus its root and cwd) and run `action`.
    ///
    /// Waits for the helper to exit. A spawn failure, non-zero exit or timeout
    /// is returned as [`WskitError::ChildProcess`] with the combined output.
    pub fn enter_and_run(
        &self,
        target: Pid,
        namespaces: &[NamespaceKind],
        action: &Action,
    ) -> Result<()> {
        let specs = descriptor_set(target, namespaces);
        let descriptors = open_descriptors(&specs)?;
        let table = SlotTable::positional(&specs);

        let moves: Vec<(RawFd, RawFd)> = descriptors
            .iter()
            .zip(table.entries())
            .map(|(fd, (_, slot))| (fd.as_raw_fd(), *slot))
            .collect();

        let (out_read, out_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| WskitError::Syscall(format!("pipe2 failed: {}", e)))?;

        debug!(
            "running {} helper for pid {} with {:?}",
            action.name(),
            target,
            table.entries()
        );

        // The command owns the write ends; drop it right after spawn so the
        // reader sees EOF when the child exits.
        let spawned = {
            let mut cmd = Command::new(&self.program);
            cmd.args(action.to_args())
                .env_clear()
                .envs(table.to_env())
                .stdin(Stdio::null())
                .stdout(Stdio::from(out_write.try_clone()?))
                .stderr(Stdio::from(out_write));
            for name in FORWARDED_ENV {
                if let Ok(value) = std::env::var(name) {
                    cmd.env(name, value);
                }
            }
            // SAFETY: dup2 is async-signal-safe and `moves` is not touched
            // by the parent after fork.
            unsafe {
                cmd.pre_exec(move || {
                    for &(fd, slot) in &moves {
                        if libc::dup2(fd, slot) < 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                    }
                    Ok(())
                });
            }
            cmd.spawn()
        };
        drop(descriptors);

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return Err(WskitError::child_process(
                    format!("cannot start {} helper: {}", action.name(), e),
                    b"",
                ))
            }
        };

        let reader = spawn_output_reader(out_read);
        let status = wait_with_deadline(&mut child, self.timeout)?;
        let output = reader.join().unwrap_or_default();

        match status {
            Some(status) if status.success() => {
                debug!("{} helper for pid {} finished", action.name(), target);
                Ok(())
            }
            Some(status) => Err(WskitError::child_process(
                format!("{} helper failed: {}", action.name(), status),
                &output,
            )),
            None => {
                warn!(
                    "{} helper for pid {} killed after {:?}",
                    action.name(),
                    target,
                    self.timeout
                );
                Err(WskitError::child_process(
                    format!("{} helper timed out after {:?}", action.name(), self.timeout),
                    &output,
                ))
            }
        }
    }
}

/// Open every entry of the set, moved above the slot range
fn open_descriptors(specs: &[DescriptorSpec]) -> Result<Vec<OwnedFd>> {
    specs
        .iter()
        .map(|spec| {
            let file = OpenOptions::new()
                .read(true)
                .custom_flags(spec.flags)
                .open(&spec.source)
                .map_err(|e| {
                    WskitError::Namespace(format!(
                        "cannot open {}: {}",
                        spec.source.display(),
                        e
                    ))
                })?;
            let raised = fcntl(file.as_raw_fd(), FcntlArg::F_DUPFD_CLOEXEC(SLOT_FLOOR))
                .map_err(|e| WskitError::Syscall(format!("F_DUPFD_CLOEXEC failed: {}", e)))?;
            // SAFETY: fcntl returned a fresh descriptor we now own
            Ok(unsafe { OwnedFd::from_raw_fd(raised) })
        })
        .collect()
}

fn spawn_output_reader(fd: OwnedFd) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = File::from(fd).read_to_end(&mut buf);
        buf
    })
}

/// Wait for `child`, killing it once `timeout` has passed. `None` means killed.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(WAIT_INTERVAL);
    }
}
