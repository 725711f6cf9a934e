//! Handing the listener fd from the trapped side to the interceptor

use std::fs;
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use log::{debug, info};
use wskit_core::{Result, WskitError};
use wskit_seccomp::{build_notify_filter, install_notify_filter, recv_fd, send_fd, NotifyListener};

use crate::dispatcher::HANDLED_SYSCALLS;

/// Bind `path` and wait for the trapped side to send its listener fd
pub fn accept_listener(path: &Path) -> Result<NotifyListener> {
    match fs::remove_file(path) {
        Ok(()) => debug!("removed stale socket {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let socket = UnixListener::bind(path)?;
    info!("waiting for listener fd on {}", path.display());
    let (stream, _) = socket.accept()?;
    let listener = receive_listener(&stream)?;
    let _ = fs::remove_file(path);
    Ok(listener)
}

/// Receive the listener fd over an already connected stream
pub fn receive_listener(stream: &UnixStream) -> Result<NotifyListener> {
    let fd = recv_fd(stream.as_raw_fd())
        .map_err(|e| WskitError::Seccomp(format!("cannot receive listener fd: {}", e)))?;
    Ok(NotifyListener::new(fd))
}

/// Install the mount filter on the calling thread and send the listener fd
/// over `stream`. The local copy is closed afterwards.
pub fn trap_and_hand_over(stream: &UnixStream) -> Result<()> {
    let filter = build_notify_filter(HANDLED_SYSCALLS)?;
    let listener = install_notify_filter(&filter)?;
    send_fd(stream.as_raw_fd(), listener.as_raw_fd())
        .map_err(|e| WskitError::Seccomp(format!("cannot send listener fd: {}", e)))
}
