//! Child side of the namespace entry helper
//!
//! Runs in the re-executed binary before anything else starts threads:
//! setns(2) into a mount namespace fails for multi-threaded callers.

use std::os::fd::RawFd;

use log::debug;
use nix::unistd::chroot;
use wskit_core::{Result, WskitError};

use crate::action::Action;
use crate::slots::{DescriptorKind, SlotTable};

/// Exit code when the inherited environment or slots are unusable
pub const EXIT_BAD_SLOTS: i32 = 2;
/// Exit code when joining a namespace, root or working directory failed
pub const EXIT_JOIN_FAILED: i32 = 3;
/// Exit code when the action itself failed
pub const EXIT_ACTION_FAILED: i32 = 4;

/// Lifecycle of a helper child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    Spawned,
    NamespacesJoined,
    ActionExecuted,
    Exited,
}

impl HelperState {
    /// Move to `next`, rejecting anything but the forward edges
    pub fn advance(self, next: HelperState) -> Result<HelperState> {
        use HelperState::*;
        match (self, next) {
            (Spawned, NamespacesJoined)
            | (NamespacesJoined, ActionExecuted)
            | (Spawned, Exited)
            | (NamespacesJoined, Exited)
            | (ActionExecuted, Exited) => Ok(next),
            _ => Err(WskitError::Namespace(format!(
                "invalid helper transition {:?} -> {:?}",
                self, next
            ))),
        }
    }
}

/// Run `action` inside the context described by the inherited slot table.
///
/// Returns the process exit code; failures are reported on stderr, which the
/// parent captures.
pub fn run_helper(action: &Action) -> i32 {
    let mut state = HelperState::Spawned;
    let code = match step(&mut state, action) {
        Ok(()) => 0,
        Err((code, e)) => {
            eprintln!("{}", e);
            code
        }
    };
    if let Ok(exited) = state.advance(HelperState::Exited) {
        debug!("{} helper {:?} -> {:?} ({})", action.name(), state, exited, code);
    }
    code
}

fn step(state: &mut HelperState, action: &Action) -> std::result::Result<(), (i32, WskitError)> {
    let table = SlotTable::from_env(std::env::vars()).map_err(|e| (EXIT_BAD_SLOTS, e))?;

    let joined = join(&table);
    close_slots(&table);
    joined.map_err(|e| (EXIT_JOIN_FAILED, e))?;
    *state = state
        .advance(HelperState::NamespacesJoined)
        .map_err(|e| (EXIT_JOIN_FAILED, e))?;

    action.execute().map_err(|e| (EXIT_ACTION_FAILED, e))?;
    *state = state
        .advance(HelperState::ActionExecuted)
        .map_err(|e| (EXIT_ACTION_FAILED, e))?;
    Ok(())
}

/// Enter every inherited namespace, then the root and working directory
fn join(table: &SlotTable) -> Result<()> {
    for (ns, slot) in table.namespaces() {
        // SAFETY: slot is an inherited namespace handle
        let rc = unsafe { libc::setns(slot, ns.clone_flag().bits()) };
        if rc < 0 {
            return Err(WskitError::Namespace(format!(
                "setns {} (fd {}) failed: {}",
                ns.proc_name(),
                slot,
                std::io::Error::last_os_error()
            )));
        }
    }

    let root = required(table, DescriptorKind::RootDir)?;
    let cwd = required(table, DescriptorKind::WorkDir)?;

    fchdir(root)?;
    chroot(".").map_err(|e| WskitError::Namespace(format!("chroot failed: {}", e)))?;
    fchdir(cwd)
}

fn required(table: &SlotTable, kind: DescriptorKind) -> Result<RawFd> {
    table
        .slot(kind)
        .ok_or_else(|| WskitError::Namespace(format!("missing {}", kind.env_name())))
}

fn fchdir(fd: RawFd) -> Result<()> {
    // SAFETY: fd is an inherited directory handle
    if unsafe { libc::fchdir(fd) } < 0 {
        return Err(WskitError::Namespace(format!(
            "fchdir (fd {}) failed: {}",
            fd,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn close_slots(table: &SlotTable) {
    for (_, slot) in table.entries() {
        // SAFETY: the slots belong to this process and are not used afterwards
        unsafe { libc::close(*slot) };
    }
}
