//! wskit-fs: mount primitives and relocation of privileged mounts
//!
//! A mount created by the privileged daemon lives in the interceptor's view.
//! [`Relocator`] brings it to the caller's destination, either through a
//! staging directory visible inside the target or with a single direct move.

pub mod mount;
pub mod relocate;

pub use mount::{detach, move_mount};
pub use relocate::{MountRelocation, Relocator, StagedMount, MAX_STAGING_ATTEMPTS};
