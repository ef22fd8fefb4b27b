// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared kernel-facing helpers.

// From dependency library

// From standard library
use std::ffi::CStr;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::{AsRawFd, RawFd};

// From this library

/// `BLKGETSIZE64`: size of a block device, in bytes.
const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

/// Returns the kernel's description of an OS error, without the
/// `(os error N)` suffix [`std::io::Error`] appends when displayed.
pub(crate) fn os_error_string(err: &io::Error) -> String {
    match err.raw_os_error() {
        Some(code) => {
            let ptr = unsafe { libc::strerror(code) };
            if ptr.is_null() {
                err.to_string()
            } else {
                unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
            }
        }
        None => err.to_string(),
    }
}

/// Returns the size, in bytes, of a regular file or a block device.
pub(crate) fn device_size(file: &File) -> io::Result<u64> {
    let metadata = file.metadata()?;

    if metadata.file_type().is_block_device() {
        let mut size: u64 = 0;
        let result = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };

        match result {
            0 => Ok(size),
            _ => Err(io::Error::last_os_error()),
        }
    } else {
        Ok(metadata.len())
    }
}

/// Sets or clears the close-on-exec flag on a file descriptor.
pub(crate) fn set_cloexec(fd: RawFd, enable: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let flags = if enable {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };

    let result = unsafe { libc::fcntl(fd, libc::F_SETFD, flags) };
    match result {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

/// Returns `true` when the process runs with root privileges. Kernel device
/// tests skip without them.
#[cfg(test)]
pub(crate) fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn sys_utils_os_error_string_drops_the_code_suffix() {
        let err = io::Error::from_raw_os_error(libc::EIO);

        let actual = os_error_string(&err);
        let expected = "Input/output error";
        assert_eq!(actual, expected);
    }

    #[test]
    fn sys_utils_device_size_reports_a_regular_file_length() -> std::io::Result<()> {
        let mut file = tempfile::tempfile()?;
        file.write_all(&[0u8; 8192])?;

        let actual = device_size(&file)?;
        let expected = 8192;
        assert_eq!(actual, expected);

        Ok(())
    }
}
