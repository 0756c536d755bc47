//! Cross-process advisory locking for the byte range a [`crate::file::File`]
//! verb is about to touch.
//!
//! POSIX locks are true byte-range locks (`fcntl(F_SETLKW)`); Windows locks
//! are whole-file only (`LockFileEx`/`UnlockFileEx` ignore `start`/`len`
//! entirely). Callers get the same function signature on both platforms and
//! must not rely on Windows actually limiting the locked range.

use std::fs::File as StdFile;
use std::io;

/// Which kind of advisory lock to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
}

/// RAII guard that releases the lock on drop, so every exit path (including
/// an early `?` return) releases before the enclosing verb returns.
///
/// Holds the raw descriptor rather than a borrow of the `File` so that
/// callers can still access the file mutably (seek/read/write) while the
/// guard is alive.
pub struct LockGuard {
    descriptor: platform::RawDescriptor,
    start: u64,
    len: u64,
}

impl LockGuard {
    pub fn acquire(file: &StdFile, kind: LockKind, start: u64, len: u64) -> io::Result<Self> {
        lock_range(file, kind, start, len)?;
        Ok(LockGuard {
            descriptor: platform::raw_descriptor(file),
            start,
            len,
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = unlock_range_raw(self.descriptor, self.start, self.len) {
            log::warn!("failed to release lock: {}", err);
        }
    }
}

#[cfg(unix)]
mod platform {
    use super::LockKind;
    use std::fs::File as StdFile;
    use std::io;
    use std::os::unix::io::{AsRawFd, RawFd};

    pub type RawDescriptor = RawFd;

    pub fn raw_descriptor(file: &StdFile) -> RawDescriptor {
        file.as_raw_fd()
    }

    pub fn lock_range(file: &StdFile, kind: LockKind, start: u64, len: u64) -> io::Result<()> {
        apply(file.as_raw_fd(), kind_to_type(kind), start, len)
    }

    pub fn unlock_range_raw(fd: RawDescriptor, start: u64, len: u64) -> io::Result<()> {
        apply(fd, libc::F_UNLCK as libc::c_short, start, len)
    }

    fn kind_to_type(kind: LockKind) -> libc::c_short {
        match kind {
            LockKind::Read => libc::F_RDLCK as libc::c_short,
            LockKind::Write => libc::F_WRLCK as libc::c_short,
        }
    }

    fn apply(fd: RawFd, l_type: libc::c_short, start: u64, len: u64) -> io::Result<()> {
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = l_type;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        fl.l_start = start as libc::off_t;
        fl.l_len = len as libc::off_t;

        let rc = unsafe { libc::fcntl(fd, libc::F_SETLKW, &fl) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(windows)]
mod platform {
    use super::LockKind;
    use std::fs::File as StdFile;
    use std::io;
    use std::os::windows::io::{AsRawHandle, RawHandle};
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, UnlockFile, LOCKFILE_EXCLUSIVE_LOCK,
    };

    pub type RawDescriptor = RawHandle;

    pub fn raw_descriptor(file: &StdFile) -> RawDescriptor {
        file.as_raw_handle()
    }

    /// `start`/`len` are accepted for signature parity with the Unix side
    /// but ignored: Windows advisory locks taken here always cover the
    /// whole file.
    pub fn lock_range(file: &StdFile, kind: LockKind, _start: u64, _len: u64) -> io::Result<()> {
        let handle = file.as_raw_handle() as *mut core::ffi::c_void;
        let flags = match kind {
            LockKind::Read => 0,
            LockKind::Write => LOCKFILE_EXCLUSIVE_LOCK,
        };
        let mut overlapped = unsafe { std::mem::zeroed() };
        let ok = unsafe { LockFileEx(handle, flags, 0, u32::MAX, u32::MAX, &mut overlapped) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn unlock_range_raw(handle: RawDescriptor, _start: u64, _len: u64) -> io::Result<()> {
        let handle = handle as *mut core::ffi::c_void;
        let ok = unsafe { UnlockFile(handle, 0, 0, u32::MAX, u32::MAX) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

use platform::unlock_range_raw;
pub use platform::lock_range;
