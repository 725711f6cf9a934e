//! Mount relocation into a target's mount namespace

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nix::unistd::Pid;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use wskit_core::{RelocationStrategy, Result, WskitError};
use wskit_namespace::{shares_namespace, Action, MountAction, NamespaceKind, NamespaceRunner};

use crate::mount::{detach, move_mount};

/// Attempts at finding an unused staging id before giving up
pub const MAX_STAGING_ATTEMPTS: usize = 8;

/// Moves a mount created elsewhere to its destination inside a target process
pub trait MountRelocation {
    fn relocate(&mut self, pid: Pid, location: &Path, dest: &Path) -> Result<()>;
}

/// A staging directory reserved for one relocation.
///
/// Dropping it detaches whatever was staged there and removes the directory.
/// The staging root propagates into targets, so the interceptor's copy of a
/// staged mount outlives the move done inside the target.
#[derive(Debug)]
pub struct StagedMount {
    id: u32,
    path: PathBuf,
    staged: bool,
}

impl StagedMount {
    /// Create `staging_root/<id>` exclusively, drawing a fresh id on collision
    pub fn reserve(staging_root: &Path, rng: &mut dyn RngCore) -> Result<Self> {
        fs::create_dir_all(staging_root).map_err(|e| {
            WskitError::Relocation(format!(
                "cannot create staging root {}: {}",
                staging_root.display(),
                e
            ))
        })?;

        for _ in 0..MAX_STAGING_ATTEMPTS {
            let id = rng.next_u32();
            let path = staging_root.join(id.to_string());
            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!("reserved staging dir {}", path.display());
                    return Ok(Self {
                        id,
                        path,
                        staged: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("staging id {} taken, retrying", id);
                }
                Err(e) => {
                    return Err(WskitError::Relocation(format!(
                        "cannot create {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Err(WskitError::Relocation(format!(
            "no free staging id under {} after {} attempts",
            staging_root.display(),
            MAX_STAGING_ATTEMPTS
        )))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the mount at `location` into this staging directory
    pub fn stage(&mut self, location: &Path) -> Result<()> {
        move_mount(location, &self.path)?;
        self.staged = true;
        Ok(())
    }
}

impl Drop for StagedMount {
    fn drop(&mut self) {
        if self.staged {
            if let Err(e) = detach(&self.path) {
                warn!("{}", e);
            }
        }
        if let Err(e) = fs::remove_dir(&self.path) {
            warn!("cannot remove {}: {}", self.path.display(), e);
        }
    }
}

/// Relocates mounts following one configured [`RelocationStrategy`]
pub struct Relocator {
    strategy: RelocationStrategy,
    runner: NamespaceRunner,
    rng: Box<dyn RngCore + Send>,
}

impl Relocator {
    pub fn new(strategy: RelocationStrategy, runner: NamespaceRunner) -> Self {
        Self {
            strategy,
            runner,
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    /// Replace the staging id source
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn strategy(&self) -> &RelocationStrategy {
        &self.strategy
    }

    fn relocate_staged(
        &mut self,
        staging_root: &Path,
        staging_mount_point: &Path,
        pid: Pid,
        location: &Path,
        dest: &Path,
    ) -> Result<()> {
        let mut staged = StagedMount::reserve(staging_root, self.rng.as_mut())?;
        staged.stage(location)?;

        let inside = staging_mount_point.join(staged.id().to_string());
        let action = Action::Mount(MountAction::move_mount(&inside, dest));
        self.runner
            .enter_and_run(pid, &[NamespaceKind::Mount], &action)?;

        info!(
            "relocated {} to {} in pid {} via {}",
            location.display(),
            dest.display(),
            pid,
            inside.display()
        );
        Ok(())
    }
}

impl MountRelocation for Relocator {
    fn relocate(&mut self, pid: Pid, location: &Path, dest: &Path) -> Result<()> {
        match self.strategy.clone() {
            RelocationStrategy::Staged {
                staging_root,
                staging_mount_point,
            } => self.relocate_staged(&staging_root, &staging_mount_point, pid, location, dest),
            RelocationStrategy::Direct => {
                check_direct(pid, dest)?;
                move_mount(location, dest)?;
                info!("relocated {} to {}", location.display(), dest.display());
                Ok(())
            }
        }
    }
}

/// A direct move happens in the interceptor's own mount namespace and
/// resolves `dest` against the interceptor's cwd; both must match the target.
fn check_direct(pid: Pid, dest: &Path) -> Result<()> {
    if !dest.is_absolute() {
        return Err(WskitError::Relocation(format!(
            "direct relocation needs an absolute destination, got {}",
            dest.display()
        )));
    }
    let shared = shares_namespace(NamespaceKind::Mount, None, Some(pid))
        .map_err(|e| WskitError::Relocation(e.to_string()))?;
    if !shared {
        return Err(WskitError::Relocation(format!(
            "pid {} is in another mount namespace; direct relocation needs a shared one",
            pid
        )));
    }
    Ok(())
}
