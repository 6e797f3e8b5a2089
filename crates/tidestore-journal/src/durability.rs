//! Platform-specific durable sync
//!
//! A journal append only counts once the bytes are on persistent media.
//! Each platform has a different call with that guarantee; this module
//! maps to the strongest one available.

use std::fs::File;
use std::io;

/// Ensure file data is durably written to persistent storage before
/// returning.
///
/// Platform behaviors:
/// - Linux: fdatasync() - syncs data but not metadata (faster than fsync)
/// - macOS/iOS: fcntl(F_FULLFSYNC) - bypasses the disk cache
/// - Windows: FlushFileBuffers() - flushes buffers and requests device flush
/// - Other: file.sync_data() - Rust stdlib fallback
///
/// May block for extended periods during heavy I/O; callers must not hold
/// locks another thread needs to make progress.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: fdatasync operates on a file descriptor obtained from a
        // live File reference, so the descriptor is open and valid.
        let result = unsafe { libc::fdatasync(fd) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: F_FULLFSYNC is a documented fcntl command on a valid,
        // open file descriptor.
        let result = unsafe { libc::fcntl(fd, libc::F_FULLFSYNC) };
        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        let handle = file.as_raw_handle();
        // SAFETY: FlushFileBuffers is called with a handle obtained from a
        // live File reference.
        let result = unsafe { winapi::um::fileapi::FlushFileBuffers(handle as *mut _) };
        if result != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "ios",
        target_os = "windows"
    )))]
    {
        file.sync_data()
    }
}
