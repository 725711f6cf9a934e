//! Interceptor configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, WskitError};

/// Default deadline for a privileged daemon round trip
pub const DEFAULT_DAEMON_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a namespace entry helper run
pub const DEFAULT_HELPER_TIMEOUT: Duration = Duration::from_secs(10);

/// How a privileged mount is moved to its final destination.
///
/// Pick one per deployment: the two are not interchangeable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationStrategy {
    /// Move the mount into `staging_root/<id>`, then enter the target's mount
    /// namespace and move `staging_mount_point/<id>` to the destination.
    /// `staging_root` must be visible inside the target as `staging_mount_point`.
    Staged {
        staging_root: PathBuf,
        staging_mount_point: PathBuf,
    },
    /// Move the mount straight to the destination. Only valid when the
    /// interceptor already lives in the target's mount namespace.
    Direct,
}

impl Default for RelocationStrategy {
    fn default() -> Self {
        RelocationStrategy::Staged {
            staging_root: PathBuf::from("/.workspace/staging"),
            staging_mount_point: PathBuf::from("/.staging"),
        }
    }
}

impl RelocationStrategy {
    pub fn staged(staging_root: impl AsRef<Path>, staging_mount_point: impl AsRef<Path>) -> Self {
        RelocationStrategy::Staged {
            staging_root: staging_root.as_ref().to_path_buf(),
            staging_mount_point: staging_mount_point.as_ref().to_path_buf(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelocationStrategy::Staged { .. } => "staged",
            RelocationStrategy::Direct => "direct",
        }
    }
}

/// Interceptor configuration
#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Unix socket of the privileged daemon
    pub daemon_socket: PathBuf,
    /// Deadline for one daemon request
    pub daemon_timeout: Duration,
    /// Bound on one namespace entry helper run
    pub helper_timeout: Duration,
    /// Relocation strategy for privileged mounts
    pub relocation: RelocationStrategy,
    /// Filesystem types whose mount calls are handed back to the kernel untouched
    pub passthrough_fstypes: Vec<String>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            daemon_socket: PathBuf::from("/.workspace/daemon.sock"),
            daemon_timeout: DEFAULT_DAEMON_TIMEOUT,
            helper_timeout: DEFAULT_HELPER_TIMEOUT,
            relocation: RelocationStrategy::default(),
            passthrough_fstypes: Vec::new(),
        }
    }
}

impl InterceptorConfig {
    pub fn daemon_socket(mut self, path: impl AsRef<Path>) -> Self {
        self.daemon_socket = path.as_ref().to_path_buf();
        self
    }

    pub fn daemon_timeout(mut self, timeout: Duration) -> Self {
        self.daemon_timeout = timeout;
        self
    }

    pub fn helper_timeout(mut self, timeout: Duration) -> Self {
        self.helper_timeout = timeout;
        self
    }

    pub fn relocation(mut self, strategy: RelocationStrategy) -> Self {
        self.relocation = strategy;
        self
    }

    pub fn passthrough(mut self, fstype: impl Into<String>) -> Self {
        self.passthrough_fstypes.push(fstype.into());
        self
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.daemon_socket.as_os_str().is_empty() {
            return Err(WskitError::InvalidConfig(
                "daemon socket path cannot be empty".to_string(),
            ));
        }
        if self.daemon_timeout.is_zero() {
            return Err(WskitError::InvalidConfig(
                "daemon timeout must be greater than zero".to_string(),
            ));
        }
        if self.helper_timeout.is_zero() {
            return Err(WskitError::InvalidConfig(
                "helper timeout must be greater than zero".to_string(),
            ));
        }
        if let RelocationStrategy::Staged {
            staging_root,
            staging_mount_point,
        } = &self.relocation
        {
            if !staging_root.is_absolute() || !staging_mount_point.is_absolute() {
                return Err(WskitError::InvalidConfig(format!(
                    "staging paths must be absolute: root={} mount point={}",
                    staging_root.display(),
                    staging_mount_point.display()
                )));
            }
        }
        // proc is always handled through the daemon
        if self.passthrough_fstypes.iter().any(|t| t == "proc") {
            return Err(WskitError::InvalidConfig(
                "proc cannot be a pass-through filesystem type".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = InterceptorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.daemon_timeout, Duration::from_secs(10));
        assert_eq!(config.relocation.name(), "staged");
    }

    #[test]
    fn test_builder_setters() {
        let config = InterceptorConfig::default()
            .daemon_socket("/run/daemon.sock")
            .daemon_timeout(Duration::from_secs(3))
            .relocation(RelocationStrategy::Direct)
            .passthrough("tmpfs");
        assert_eq!(config.daemon_socket, PathBuf::from("/run/daemon.sock"));
        assert_eq!(config.daemon_timeout, Duration::from_secs(3));
        assert_eq!(config.relocation, RelocationStrategy::Direct);
        assert_eq!(config.passthrough_fstypes, vec!["tmpfs".to_string()]);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = InterceptorConfig::default().daemon_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_staging_rejected() {
        let config = InterceptorConfig::default()
            .relocation(RelocationStrategy::staged("staging", "/.staging"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_proc_passthrough_rejected() {
        let config = InterceptorConfig::default().passthrough("proc");
        assert!(config.validate().is_err());
    }
}
