//! Error types for interception and relocation

use std::io;
use thiserror::Error;

/// Result type for wskit operations
pub type Result<T> = std::result::Result<T, WskitError>;

/// Errors that can occur while handling an intercepted syscall
#[derive(Error, Debug)]
pub enum WskitError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Syscall error: {0}")]
    Syscall(String),

    #[error("Namespace error: {0}")]
    Namespace(String),

    #[error("Seccomp error: {0}")]
    Seccomp(String),

    /// An argument could not be read from the target's memory.
    #[error("Fault: {0}")]
    Fault(String),

    /// The target's memory could not be opened.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The namespace entry helper failed to spawn, exited non-zero or timed out.
    #[error("Helper process failed: {message}: {output}")]
    ChildProcess { message: String, output: String },

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Privileged daemon error: {0}")]
    Daemon(String),

    #[error("Mount relocation failed: {0}")]
    Relocation(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WskitError {
    /// Errno reported to the trapped process when handling fails with this error.
    pub fn errno(&self) -> i32 {
        match self {
            WskitError::PermissionDenied(_) | WskitError::UnsupportedOperation(_) => libc::EPERM,
            _ => libc::EFAULT,
        }
    }

    /// Build a [`WskitError::ChildProcess`] from raw helper output.
    pub fn child_process(message: impl Into<String>, output: &[u8]) -> Self {
        WskitError::ChildProcess {
            message: message.into(),
            output: String::from_utf8_lossy(output).trim_end().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WskitError::DeadlineExceeded("MountProc after 10s".to_string());
        assert_eq!(err.to_string(), "Deadline exceeded: MountProc after 10s");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = WskitError::from(io_err);
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_permission_maps_to_eperm() {
        assert_eq!(
            WskitError::PermissionDenied("mem".to_string()).errno(),
            libc::EPERM
        );
        assert_eq!(
            WskitError::UnsupportedOperation("tmpfs".to_string()).errno(),
            libc::EPERM
        );
    }

    #[test]
    fn test_failures_map_to_efault() {
        let errors = [
            WskitError::Fault("arg 1".to_string()),
            WskitError::Daemon("unreachable".to_string()),
            WskitError::DeadlineExceeded("10s".to_string()),
            WskitError::Relocation("move".to_string()),
            WskitError::child_process("exit status 3", b"setns failed\n"),
        ];
        for err in errors {
            assert_eq!(err.errno(), libc::EFAULT, "{}", err);
        }
    }

    #[test]
    fn test_child_process_keeps_output() {
        let err = WskitError::child_process("exit status 4", b"mount: EINVAL\n");
        let msg = err.to_string();
        assert!(msg.contains("exit status 4"));
        assert!(msg.ends_with("mount: EINVAL"));
    }
}
