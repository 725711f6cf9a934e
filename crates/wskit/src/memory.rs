//! Reading syscall arguments out of a trapped process's memory

use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use wskit_core::{Result, WskitError};

/// Longest string argument accepted, terminator included (PATH_MAX)
pub const MAX_STRING_LEN: usize = 4096;

const FALLBACK_PAGE_SIZE: u64 = 4096;

/// Read-only view of another process's address space.
///
/// Reads are positional reads on `/proc/<pid>/mem`; nothing is dereferenced.
/// The handle is closed when dropped.
#[derive(Debug)]
pub struct RemoteMemory {
    pid: u32,
    file: File,
    page_size: u64,
}

impl RemoteMemory {
    /// Open the memory of `pid`. Failure maps to [`WskitError::PermissionDenied`].
    pub fn open(pid: u32) -> Result<Self> {
        let path = PathBuf::from(format!("/proc/{}/mem", pid));
        let file = File::open(&path).map_err(|e| {
            WskitError::PermissionDenied(format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            pid,
            file,
            page_size: page_size(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Read a NUL-terminated string starting at `addr`, taken as raw bytes.
    ///
    /// Reads one page-bounded chunk at a time so a string ending just before
    /// an unmapped page is still readable.
    pub fn read_string(&self, addr: u64) -> Result<OsString> {
        check_addr(addr)?;

        let mut buf = Vec::with_capacity(256);
        let mut cursor = addr;
        while buf.len() < MAX_STRING_LEN {
            let to_boundary = self.page_size - cursor % self.page_size;
            let want = to_boundary.min((MAX_STRING_LEN - buf.len()) as u64) as usize;
            let mut chunk = vec![0u8; want];
            let n = self.read_some(&mut chunk, cursor)?;
            if let Some(nul) = chunk[..n].iter().position(|&b| b == 0) {
                buf.extend_from_slice(&chunk[..nul]);
                return Ok(OsString::from_vec(buf));
            }
            buf.extend_from_slice(&chunk[..n]);
            cursor = cursor.checked_add(n as u64).ok_or_else(|| {
                WskitError::Fault(format!("string at {:#x} runs off the address space", addr))
            })?;
        }

        Err(WskitError::Fault(format!(
            "string at {:#x} in pid {} is not terminated within {} bytes",
            addr, self.pid, MAX_STRING_LEN
        )))
    }

    /// Read a native-endian 64-bit word at `addr`
    pub fn read_u64(&self, addr: u64) -> Result<u64> {
        check_addr(addr)?;
        let mut word = [0u8; 8];
        self.file
            .read_exact_at(&mut word, addr)
            .map_err(|e| self.fault(addr, e))?;
        Ok(u64::from_ne_bytes(word))
    }

    /// One positional read, retried on EINTR. Zero bytes is a fault.
    fn read_some(&self, buf: &mut [u8], addr: u64) -> Result<usize> {
        loop {
            match self.file.read_at(buf, addr) {
                Ok(0) => {
                    return Err(self.fault(
                        addr,
                        io::Error::new(io::ErrorKind::UnexpectedEof, "no bytes read"),
                    ))
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fault(addr, e)),
            }
        }
    }

    fn fault(&self, addr: u64, e: io::Error) -> WskitError {
        WskitError::Fault(format!("cannot read pid {} at {:#x}: {}", self.pid, addr, e))
    }
}

/// Null and addresses past `i64::MAX` are never readable through `/proc/<pid>/mem`
fn check_addr(addr: u64) -> Result<()> {
    if addr == 0 || addr > i64::MAX as u64 {
        return Err(WskitError::Fault(format!("invalid address {:#x}", addr)));
    }
    Ok(())
}

fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    fn me() -> RemoteMemory {
        RemoteMemory::open(std::process::id()).unwrap()
    }

    #[test]
    fn test_read_own_string() {
        let s = CString::new("/workspace/proc").unwrap();
        let read = me().read_string(s.as_ptr() as u64).unwrap();
        assert_eq!(read, "/workspace/proc");
    }

    #[test]
    fn test_read_non_utf8_string() {
        let s = CString::new(&b"/w\xffs"[..]).unwrap();
        let read = me().read_string(s.as_ptr() as u64).unwrap();
        assert_eq!(read.as_bytes(), b"/w\xffs");
    }

    #[test]
    fn test_read_empty_string() {
        let s = CString::new("").unwrap();
        assert_eq!(me().read_string(s.as_ptr() as u64).unwrap(), "");
    }

    #[test]
    fn test_read_string_across_page_boundary() {
        let page = page_size() as usize;
        let mut bytes = vec![b'x'; 3 * page];
        let base = bytes.as_ptr() as usize;
        // Start 5 bytes before a page boundary, end 5 bytes after it
        let start = (base / page + 2) * page - 5 - base;
        bytes[start + 10] = 0;
        let read = me().read_string(bytes[start..].as_ptr() as u64).unwrap();
        assert_eq!(read.len(), 10);
    }

    #[test]
    fn test_unterminated_string_is_fault() {
        let bytes = vec![b'a'; MAX_STRING_LEN + 16];
        let err = me().read_string(bytes.as_ptr() as u64).unwrap_err();
        assert!(matches!(err, WskitError::Fault(_)));
    }

    #[test]
    fn test_string_at_limit_is_fault() {
        let mut bytes = vec![b'a'; MAX_STRING_LEN + 1];
        bytes[MAX_STRING_LEN] = 0;
        assert!(me().read_string(bytes.as_ptr() as u64).is_err());

        bytes[MAX_STRING_LEN - 1] = 0;
        let read = me().read_string(bytes.as_ptr() as u64).unwrap();
        assert_eq!(read.len(), MAX_STRING_LEN - 1);
    }

    #[test]
    fn test_null_and_high_addresses_are_faults() {
        let mem = me();
        assert!(matches!(mem.read_string(0), Err(WskitError::Fault(_))));
        assert!(matches!(mem.read_u64(u64::MAX), Err(WskitError::Fault(_))));
    }

    #[test]
    fn test_unmapped_address_is_fault() {
        // The first page is never mapped
        let err = me().read_string(0x10).unwrap_err();
        assert!(matches!(err, WskitError::Fault(_)));
    }

    #[test]
    fn test_read_own_word() {
        let value: u64 = 0x0123_4567_89ab_cdef;
        let read = me().read_u64(&value as *const u64 as u64).unwrap();
        assert_eq!(read, value);
    }

    #[test]
    fn test_missing_process_is_permission_error() {
        let err = RemoteMemory::open(999_999_999).unwrap_err();
        assert!(matches!(err, WskitError::PermissionDenied(_)));
        assert_eq!(err.errno(), libc::EPERM);
    }
}
