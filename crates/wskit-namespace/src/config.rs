//! Namespace kinds a helper can enter

use std::path::PathBuf;

use nix::sched::CloneFlags;
use nix::unistd::Pid;
use wskit_core::{Result, WskitError};

/// Namespace kinds that can be entered in a target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NamespaceKind {
    Mount,
    Net,
    Pid,
}

impl NamespaceKind {
    pub fn all() -> [NamespaceKind; 3] {
        [NamespaceKind::Mount, NamespaceKind::Net, NamespaceKind::Pid]
    }

    /// Entry name under /proc/<pid>/ns
    pub fn proc_name(&self) -> &'static str {
        match self {
            NamespaceKind::Mount => "mnt",
            NamespaceKind::Net => "net",
            NamespaceKind::Pid => "pid",
        }
    }

    /// Flag passed to setns(2) to check the handle's type
    pub fn clone_flag(&self) -> CloneFlags {
        match self {
            NamespaceKind::Mount => CloneFlags::CLONE_NEWNS,
            NamespaceKind::Net => CloneFlags::CLONE_NEWNET,
            NamespaceKind::Pid => CloneFlags::CLONE_NEWPID,
        }
    }

    pub fn handle_path(&self, pid: Pid) -> PathBuf {
        PathBuf::from(format!("/proc/{}/ns/{}", pid.as_raw(), self.proc_name()))
    }
}

/// Get namespace inode for a process, or for the caller when `pid` is `None`
pub fn namespace_inode(kind: NamespaceKind, pid: Option<Pid>) -> Result<u64> {
    use std::os::unix::fs::MetadataExt;

    let pid_str = match pid {
        Some(p) => p.as_raw().to_string(),
        None => "self".to_string(),
    };
    let path = format!("/proc/{}/ns/{}", pid_str, kind.proc_name());
    let stat = std::fs::metadata(&path).map_err(|e| {
        WskitError::Namespace(format!(
            "Failed to get namespace info for pid={} ns={}: {}",
            pid_str,
            kind.proc_name(),
            e
        ))
    })?;
    Ok(stat.ino())
}

/// Check if two processes share a namespace
pub fn shares_namespace(kind: NamespaceKind, pid1: Option<Pid>, pid2: Option<Pid>) -> Result<bool> {
    let inode1 = namespace_inode(kind, pid1)?;
    let inode2 = namespace_inode(kind, pid2)?;
    Ok(inode1 == inode2)
}
