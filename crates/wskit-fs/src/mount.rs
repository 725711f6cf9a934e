//! Mount primitives used by relocation

use std::path::Path;

use log::debug;
use nix::errno::Errno;
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use wskit_core::{Result, WskitError};

/// Move the mount at `source` to `target` in the caller's mount namespace
pub fn move_mount(source: &Path, target: &Path) -> Result<()> {
    debug!("MS_MOVE {} -> {}", source.display(), target.display());
    mount(Some(source), target, None::<&str>, MsFlags::MS_MOVE, None::<&str>).map_err(|e| {
        WskitError::Syscall(format!(
            "MS_MOVE {} -> {} failed: {}",
            source.display(),
            target.display(),
            e
        ))
    })
}

/// Lazily detach the mount at `target`.
///
/// A target that is gone or no longer a mount point counts as detached.
pub fn detach(target: &Path) -> Result<()> {
    match umount2(target, MntFlags::MNT_DETACH) {
        Ok(()) | Err(Errno::EINVAL) | Err(Errno::ENOENT) => Ok(()),
        Err(e) => Err(WskitError::Syscall(format!(
            "Failed to detach {}: {}",
            target.display(),
            e
        ))),
    }
}
