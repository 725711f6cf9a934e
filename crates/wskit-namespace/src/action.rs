//! Actions a helper child can run inside the entered namespaces

use std::ffi::OsString;
use std::path::PathBuf;

use log::info;
use nix::mount::{mount, MsFlags};
use wskit_core::{Result, WskitError};

/// Subcommand the current binary dispatches helper runs under
pub const HELPER_SUBCOMMAND: &str = "handler";

/// `mount(2)` arguments as carried across the process boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountAction {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Native mount flag bitmask
    pub flags: u64,
    pub data: Option<String>,
}

impl MountAction {
    /// An `MS_MOVE` of the mount at `source` to `target`
    pub fn move_mount(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            flags: MsFlags::MS_MOVE.bits() as u64,
            data: None,
        }
    }
}

/// A single action run by a helper child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Mount(MountAction),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Mount(_) => "mount",
        }
    }

    /// Argument list after the binary path, starting with the helper subcommand.
    ///
    /// Paths are passed as raw bytes. Empty mount data is left out rather
    /// than passed as an empty string.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![HELPER_SUBCOMMAND.into(), self.name().into()];
        match self {
            Action::Mount(m) => {
                args.extend([
                    "--source".into(),
                    m.source.clone().into_os_string(),
                    "--target".into(),
                    m.target.clone().into_os_string(),
                    "--flags".into(),
                    m.flags.to_string().into(),
                ]);
                if let Some(data) = m.data.as_deref().filter(|d| !d.is_empty()) {
                    args.push("--data".into());
                    args.push(data.into());
                }
            }
        }
        args
    }

    /// Run the action in the current (already entered) context
    pub fn execute(&self) -> Result<()> {
        match self {
            Action::Mount(m) => {
                let flags = MsFlags::from_bits_truncate(m.flags as libc::c_ulong);
                info!(
                    "mount source={} target={} flags={:?}",
                    m.source.display(),
                    m.target.display(),
                    flags
                );
                mount(
                    Some(m.source.as_path()),
                    m.target.as_path(),
                    None::<&str>,
                    flags,
                    m.data.as_deref(),
                )
                .map_err(|e| {
                    WskitError::Syscall(format!(
                        "mount {} -> {} failed: {}",
                        m.source.display(),
                        m.target.display(),
                        e
                    ))
                })
            }
        }
    }
}
