//! Relocation tests against real mounts
//!
//! These tests require root and run inside a private mount namespace.

use std::fs;
use std::time::Duration;

use nix::mount::{mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::Pid;
use wskit_core::RelocationStrategy;
use wskit_fs::{MountRelocation, Relocator};
use wskit_namespace::NamespaceRunner;

fn private_mount_namespace() {
    unshare(CloneFlags::CLONE_NEWNS).unwrap();
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .unwrap();
}

/// Forks so the namespace change does not leak into other tests.
fn in_child(test: fn()) {
    unsafe {
        let pid = libc::fork();
        assert!(pid >= 0);
        if pid == 0 {
            let ok = std::panic::catch_unwind(test).is_ok();
            libc::_exit(if ok { 0 } else { 1 });
        }
        let mut status = 0;
        libc::waitpid(pid, &mut status, 0);
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), 0, "child test failed");
    }
}

#[test]
#[ignore] // Requires root
fn direct_relocation_moves_tmpfs() {
    in_child(|| {
        private_mount_namespace();
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("privileged");
        let dest = dir.path().join("dest");
        fs::create_dir(&location).unwrap();
        fs::create_dir(&dest).unwrap();
        mount(Some("tmpfs"), &location, Some("tmpfs"), MsFlags::empty(), None::<&str>).unwrap();
        fs::write(location.join("marker"), b"x").unwrap();

        let mut relocator = Relocator::new(
            RelocationStrategy::Direct,
            NamespaceRunner::new(Duration::from_secs(5)),
        );
        relocator.relocate(Pid::this(), &location, &dest).unwrap();

        assert!(dest.join("marker").exists());
        assert!(!location.join("marker").exists());
    });
}
