// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

// From this library
use crate::core::chunk::CHUNK_SIZE;
use crate::core::errors::NbdDeviceError;
use crate::sys_utils;

const NBD_SET_SOCK: libc::c_ulong = 0xab00;
const NBD_SET_BLKSIZE: libc::c_ulong = 0xab01;
const NBD_DO_IT: libc::c_ulong = 0xab03;
const NBD_CLEAR_SOCK: libc::c_ulong = 0xab04;
const NBD_SET_SIZE_BLOCKS: libc::c_ulong = 0xab07;
const NBD_DISCONNECT: libc::c_ulong = 0xab08;
const NBD_SET_TIMEOUT: libc::c_ulong = 0xab09;
const NBD_SET_FLAGS: libc::c_ulong = 0xab0a;

const NBD_FLAG_HAS_FLAGS: libc::c_ulong = 1 << 0;
const NBD_FLAG_READ_ONLY: libc::c_ulong = 1 << 1;

/// Per-request kernel timeout, in seconds.
const KERNEL_TIMEOUT_SECS: libc::c_ulong = 10;

/// Highest NBD index probed when scanning for a free device.
const MAX_INDEX: u32 = 1023;

/// A kernel NBD block device wired to a helper-held socket.
///
/// The device is configured read-only with a 4 KiB block size; trims are
/// never advertised. A service thread parks in the kernel's `NBD_DO_IT`
/// ioctl for the lifetime of the connection, as the kernel requires.
#[derive(Debug)]
pub struct NbdDevice {
    index: u32,
    path: PathBuf,
    device: Option<File>,
    service: Option<JoinHandle<()>>,
}

impl NbdDevice {
    /// Configures a free NBD device over `sock` and starts it.
    pub fn setup(sock: &UnixStream, data_size: u64) -> Result<NbdDevice, NbdDeviceError> {
        let index = Self::find_free_index()?;
        let path = PathBuf::from(format!("/dev/nbd{index}"));

        log::debug!(
            "NbdDevice::setup configuring {:?} for {} bytes",
            path,
            data_size
        );

        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                NbdDeviceError::Startup(format!("failed to open {:?}: {}", path, e))
            })?;

        let fd = device.as_raw_fd();
        // A stale socket from a crashed server would fail SET_SOCK.
        unsafe { libc::ioctl(fd, NBD_CLEAR_SOCK) };

        ioctl(fd, NBD_SET_BLKSIZE, CHUNK_SIZE as libc::c_ulong, &path)?;
        ioctl(
            fd,
            NBD_SET_SIZE_BLOCKS,
            (data_size / CHUNK_SIZE as u64) as libc::c_ulong,
            &path,
        )?;
        ioctl(fd, NBD_SET_TIMEOUT, KERNEL_TIMEOUT_SECS, &path)?;
        ioctl(
            fd,
            NBD_SET_FLAGS,
            NBD_FLAG_HAS_FLAGS | NBD_FLAG_READ_ONLY,
            &path,
        )?;
        ioctl(fd, NBD_SET_SOCK, sock.as_raw_fd() as libc::c_ulong, &path)?;

        // NBD_DO_IT blocks until disconnect; it gets its own thread.
        let runner = device.try_clone().map_err(NbdDeviceError::from)?;
        let thread_path = path.clone();
        let service = std::thread::Builder::new()
            .name(format!("nbd{index}-service"))
            .spawn(move || {
                let result = unsafe { libc::ioctl(runner.as_raw_fd(), NBD_DO_IT) };
                if result != 0 {
                    let e = io::Error::last_os_error();
                    log::debug!(
                        "NbdDevice service for {:?} returned: {}",
                        thread_path,
                        sys_utils::os_error_string(&e)
                    );
                }
                unsafe { libc::ioctl(runner.as_raw_fd(), NBD_CLEAR_SOCK) };
            })
            .map_err(|e| {
                NbdDeviceError::Startup(format!("failed to spawn NBD service thread: {e}"))
            })?;

        log::debug!("NbdDevice::setup {:?} is live", path);

        Ok(NbdDevice {
            index,
            path,
            device: Some(device),
            service: Some(service),
        })
    }

    /// Scans the kernel's NBD control files for an index nobody serves.
    fn find_free_index() -> Result<u32, NbdDeviceError> {
        for index in 0..=MAX_INDEX {
            let base = PathBuf::from(format!("/sys/block/nbd{index}"));
            if !base.exists() {
                break;
            }

            if !base.join("pid").exists() {
                log::debug!("NbdDevice::find_free_index picked index {}", index);

                return Ok(index);
            }
        }

        let err_msg =
            "no free NBD device found (is the nbd kernel module loaded?)".to_owned();
        log::debug!("NbdDevice::find_free_index {}", err_msg);

        Err(NbdDeviceError::Startup(err_msg))
    }

    /// Returns the device node path, e.g. `/dev/nbd3`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the kernel index assigned to this device.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Disconnects the device and releases the index.
    pub fn disconnect(&mut self) -> Result<(), NbdDeviceError> {
        let Some(device) = self.device.take() else {
            return Ok(());
        };

        log::debug!("NbdDevice::disconnect disconnecting {:?}", self.path);

        let result = unsafe { libc::ioctl(device.as_raw_fd(), NBD_DISCONNECT) };
        if result != 0 {
            let e = io::Error::last_os_error();
            log::debug!(
                "NbdDevice::disconnect NBD_DISCONNECT on {:?}: {}",
                self.path,
                sys_utils::os_error_string(&e)
            );
        }

        if let Some(service) = self.service.take() {
            if service.join().is_err() {
                let err_msg = format!("NBD service thread for {:?} panicked", self.path);
                log::debug!("NbdDevice::disconnect {}", err_msg);

                return Err(NbdDeviceError::Disconnect(err_msg));
            }
        }

        Ok(())
    }
}

impl Drop for NbdDevice {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            log::error!("NbdDevice::drop {}", e);
        }
    }
}

fn ioctl(
    fd: libc::c_int,
    cmd: libc::c_ulong,
    arg: libc::c_ulong,
    path: &Path,
) -> Result<(), NbdDeviceError> {
    let result = unsafe { libc::ioctl(fd, cmd, arg) };

    match result {
        0 => Ok(()),
        _ => {
            let e = io::Error::last_os_error();
            let err_msg = format!(
                "NBD ioctl {:#06x} on {:?} failed: {}",
                cmd,
                path,
                sys_utils::os_error_string(&e)
            );
            log::debug!("NbdDevice::setup {}", err_msg);

            Err(NbdDeviceError::Startup(err_msg))
        }
    }
}
