//! Runtime detection of the kernel features interception relies on

use std::path::Path;

const SECCOMP_ACTIONS_AVAIL: &str = "/proc/sys/kernel/seccomp/actions_avail";

/// Detected system capabilities for mount interception
#[derive(Debug, Clone)]
pub struct SystemCapabilities {
    /// Running as root (euid == 0)
    pub has_root: bool,
    /// Seccomp BPF filtering is available
    pub has_seccomp: bool,
    /// The kernel supports `SECCOMP_RET_USER_NOTIF` (Linux 5.0+)
    pub has_user_notif: bool,
    /// Namespace handles are exposed under /proc/self/ns
    pub has_namespace_handles: bool,
}

impl SystemCapabilities {
    /// Detect all available capabilities on the current system
    pub fn detect() -> Self {
        Self {
            has_root: detect_root(),
            has_seccomp: detect_seccomp(),
            has_user_notif: detect_user_notif(),
            has_namespace_handles: detect_namespace_handles(),
        }
    }

    /// Check if a seccomp listener can be installed at all
    pub fn can_intercept(&self) -> bool {
        self.has_seccomp && self.has_user_notif
    }

    /// Get a human-readable summary of capabilities
    pub fn summary(&self) -> String {
        let check = |available: bool| if available { "[ok]" } else { "[--]" };

        [
            format!("{} Root privileges", check(self.has_root)),
            format!("{} Seccomp BPF", check(self.has_seccomp)),
            format!("{} Seccomp user notification", check(self.has_user_notif)),
            format!("{} Namespace handles", check(self.has_namespace_handles)),
        ]
        .join("\n")
    }
}

fn detect_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn detect_seccomp() -> bool {
    // Returns -1 with EINVAL if seccomp is not built into the kernel
    let ret = unsafe { libc::prctl(libc::PR_GET_SECCOMP, 0, 0, 0, 0) };
    ret >= 0
}

fn detect_user_notif() -> bool {
    std::fs::read_to_string(SECCOMP_ACTIONS_AVAIL)
        .map(|actions| actions_include_user_notif(&actions))
        .unwrap_or(false)
}

fn actions_include_user_notif(actions: &str) -> bool {
    actions.split_whitespace().any(|action| action == "user_notif")
}

fn detect_namespace_handles() -> bool {
    Path::new("/proc/self/ns/mnt").exists()
}
