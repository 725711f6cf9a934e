//! Client for the privileged daemon
//!
//! The daemon performs mounts the workspace cannot do itself. The wire format
//! is one JSON object per line over a Unix stream socket, one request per
//! connection.

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use nix::errno::Errno;
use nix::sys::socket::{self, AddressFamily, SockFlag, SockType, UnixAddr};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wskit_core::WskitError;

/// Upper bound on one response line
const MAX_RESPONSE_LEN: usize = 64 * 1024;

/// Pause between connect attempts while the daemon's backlog is full
const CONNECT_RETRY: Duration = Duration::from_millis(10);

/// A mount created by the daemon, as seen from the interceptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedMount {
    pub location: PathBuf,
}

/// Ways a daemon round trip can fail
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("daemon unreachable: {0}")]
    Unreachable(String),

    #[error("daemon call exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),

    #[error("daemon refused: {0}")]
    Refused(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),
}

impl From<DaemonError> for WskitError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::DeadlineExceeded(_) => WskitError::DeadlineExceeded(err.to_string()),
            other => WskitError::Daemon(other.to_string()),
        }
    }
}

/// The privileged operations the interceptor relies on
pub trait PrivilegedDaemon {
    /// Mount a fresh proc filesystem for `pid`, answering within `timeout`
    fn mount_proc(&self, pid: u32, timeout: Duration) -> Result<PrivilegedMount, DaemonError>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Request {
    MountProc { pid: i64 },
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Response {
    MountProc { location: String },
    Error { message: String },
}

/// [`PrivilegedDaemon`] over the daemon's Unix socket
#[derive(Debug, Clone)]
pub struct UnixDaemonClient {
    socket: PathBuf,
}

impl UnixDaemonClient {
    pub fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Send one request and read one response line; connect, write and read
    /// share the same deadline.
    pub fn call(&self, request: &Request, timeout: Duration) -> Result<Response, DaemonError> {
        let deadline = Deadline::new(timeout);

        let mut stream = connect(&self.socket, &deadline)?;

        let mut line = serde_json::to_vec(request)
            .map_err(|e| DaemonError::Protocol(format!("cannot encode request: {}", e)))?;
        line.push(b'\n');

        stream
            .set_write_timeout(Some(deadline.remaining()?))
            .map_err(|e| DaemonError::Unreachable(e.to_string()))?;
        stream
            .write_all(&line)
            .map_err(|e| deadline.classify(e, "write"))?;

        let raw = read_line(&mut stream, &deadline)?;
        let response: Response = serde_json::from_slice(&raw)
            .map_err(|e| DaemonError::Protocol(format!("cannot decode response: {}", e)))?;
        debug!("daemon answered {:?}", response);
        Ok(response)
    }
}

impl PrivilegedDaemon for UnixDaemonClient {
    fn mount_proc(&self, pid: u32, timeout: Duration) -> Result<PrivilegedMount, DaemonError> {
        let request = Request::MountProc { pid: pid as i64 };
        match self.call(&request, timeout)? {
            Response::MountProc { location } if !location.is_empty() => Ok(PrivilegedMount {
                location: PathBuf::from(location),
            }),
            Response::MountProc { .. } => {
                Err(DaemonError::Protocol("empty mount location".to_string()))
            }
            Response::Error { message } => Err(DaemonError::Refused(message)),
        }
    }
}

struct Deadline {
    timeout: Duration,
    at: Instant,
}

impl Deadline {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            at: Instant::now() + timeout,
        }
    }

    fn remaining(&self) -> Result<Duration, DaemonError> {
        let left = self.at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(DaemonError::DeadlineExceeded(self.timeout));
        }
        Ok(left)
    }

    fn classify(&self, e: io::Error, op: &str) -> DaemonError {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                DaemonError::DeadlineExceeded(self.timeout)
            }
            _ => DaemonError::Unreachable(format!("{} failed: {}", op, e)),
        }
    }
}

/// Connect without blocking past the deadline.
///
/// A non-blocking Unix connect fails with EAGAIN while the listener's backlog
/// is full; it is retried until the deadline runs out.
fn connect(path: &Path, deadline: &Deadline) -> Result<UnixStream, DaemonError> {
    let unreachable = |e: Errno| DaemonError::Unreachable(format!("{}: {}", path.display(), e));
    let addr = UnixAddr::new(path).map_err(unreachable)?;
    let fd = socket::socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(unreachable)?;

    loop {
        deadline.remaining()?;
        match socket::connect(fd.as_raw_fd(), &addr) {
            Ok(()) => break,
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => thread::sleep(deadline.remaining()?.min(CONNECT_RETRY)),
            Err(e) => return Err(unreachable(e)),
        }
    }

    let stream = UnixStream::from(fd);
    stream
        .set_nonblocking(false)
        .map_err(|e| DaemonError::Unreachable(e.to_string()))?;
    Ok(stream)
}

/// Read up to the first newline, re-arming the read timeout before every read
fn read_line(stream: &mut UnixStream, deadline: &Deadline) -> Result<Vec<u8>, DaemonError> {
    let mut line = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        stream
            .set_read_timeout(Some(deadline.remaining()?))
            .map_err(|e| DaemonError::Unreachable(e.to_string()))?;
        let n = match stream.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(deadline.classify(e, "read")),
        };
        if n == 0 {
            return Err(DaemonError::Protocol(
                "connection closed before a full response".to_string(),
            ));
        }
        if let Some(pos) = chunk[..n].iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&chunk[..pos]);
            return Ok(line);
        }
        line.extend_from_slice(&chunk[..n]);
        if line.len() > MAX_RESPONSE_LEN {
            return Err(DaemonError::Protocol("response line too long".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::socket::Backlog;
    use std::io::{BufRead, BufReader};
    use std::os::unix::net::UnixListener;

    /// Serve one connection with `reply`, returning the request line received
    fn serve_once(
        dir: &Path,
        reply: impl FnOnce(&mut UnixStream) + Send + 'static,
    ) -> (PathBuf, thread::JoinHandle<String>) {
        let path = dir.join("daemon.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = String::new();
            BufReader::new(stream.try_clone().unwrap())
                .read_line(&mut request)
                .unwrap();
            reply(&mut stream);
            request
        });
        (path, handle)
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_string(&Request::MountProc { pid: 42 }).unwrap();
        assert_eq!(json, r#"{"type":"MountProc","pid":42}"#);
    }

    #[test]
    fn test_response_wire_format() {
        let ok: Response =
            serde_json::from_str(r#"{"type":"MountProc","location":"/mnt/proc-1"}"#).unwrap();
        assert_eq!(
            ok,
            Response::MountProc {
                location: "/mnt/proc-1".to_string()
            }
        );
        let err: Response = serde_json::from_str(r#"{"type":"Error","message":"no"}"#).unwrap();
        assert_eq!(
            err,
            Response::Error {
                message: "no".to_string()
            }
        );
    }

    #[test]
    fn test_mount_proc_success() {
        let dir = tempfile::tempdir().unwrap();
        let (path, server) = serve_once(dir.path(), |s| {
            s.write_all(b"{\"type\":\"MountProc\",\"location\":\"/tmp/proc-7\"}\n")
                .unwrap();
        });

        let client = UnixDaemonClient::new(&path);
        let mount = client.mount_proc(1234, Duration::from_secs(5)).unwrap();
        assert_eq!(mount.location, PathBuf::from("/tmp/proc-7"));
        assert_eq!(
            server.join().unwrap().trim_end(),
            r#"{"type":"MountProc","pid":1234}"#
        );
    }

    #[test]
    fn test_error_response_is_refusal() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _server) = serve_once(dir.path(), |s| {
            s.write_all(b"{\"type\":\"Error\",\"message\":\"pid not in workspace\"}\n")
                .unwrap();
        });

        let err = UnixDaemonClient::new(&path)
            .mount_proc(1, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, DaemonError::Refused(ref m) if m == "pid not in workspace"));
    }

    #[test]
    fn test_garbage_is_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _server) = serve_once(dir.path(), |s| {
            s.write_all(b"not json\n").unwrap();
        });

        let err = UnixDaemonClient::new(&path)
            .mount_proc(1, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, DaemonError::Protocol(_)));
    }

    #[test]
    fn test_silent_daemon_hits_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _server) = serve_once(dir.path(), |_| {
            thread::sleep(Duration::from_secs(2));
        });

        let start = Instant::now();
        let err = UnixDaemonClient::new(&path)
            .mount_proc(1, Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, DaemonError::DeadlineExceeded(_)));
        assert!(start.elapsed() < Duration::from_secs(2));

        let wskit: WskitError = err.into();
        assert!(matches!(wskit, WskitError::DeadlineExceeded(_)));
        assert_eq!(wskit.errno(), libc::EFAULT);
    }

    #[test]
    fn test_full_backlog_hits_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.sock");
        let addr = UnixAddr::new(&path).unwrap();

        // A daemon that is alive but never accepts
        let listener = socket::socket(
            AddressFamily::Unix,
            SockType::Stream,
            SockFlag::empty(),
            None,
        )
        .unwrap();
        socket::bind(listener.as_raw_fd(), &addr).unwrap();
        socket::listen(&listener, Backlog::new(1).unwrap()).unwrap();

        let mut queued = Vec::new();
        loop {
            let fd = socket::socket(
                AddressFamily::Unix,
                SockType::Stream,
                SockFlag::SOCK_NONBLOCK,
                None,
            )
            .unwrap();
            match socket::connect(fd.as_raw_fd(), &addr) {
                Ok(()) => queued.push(fd),
                Err(Errno::EAGAIN) => break,
                Err(e) => panic!("unexpected connect error: {}", e),
            }
            assert!(queued.len() < 64, "backlog never filled");
        }

        let start = Instant::now();
        let err = UnixDaemonClient::new(&path)
            .mount_proc(1, Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, DaemonError::DeadlineExceeded(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_missing_socket_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let err = UnixDaemonClient::new(dir.path().join("absent.sock"))
            .mount_proc(1, Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, DaemonError::Unreachable(_)));
    }
}
