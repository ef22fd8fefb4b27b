// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

// From this library
use crate::core::errors::LoopDeviceError;
use crate::sys_utils;

const LOOP_CONTROL: &str = "/dev/loop-control";

const LOOP_SET_FD: libc::c_ulong = 0x4c00;
const LOOP_CLR_FD: libc::c_ulong = 0x4c01;
const LOOP_SET_STATUS64: libc::c_ulong = 0x4c04;
const LOOP_CTL_GET_FREE: libc::c_ulong = 0x4c82;

const LO_FLAGS_READ_ONLY: u32 = 1;

#[repr(C)]
struct LoopInfo64 {
    lo_device: u64,
    lo_inode: u64,
    lo_rdevice: u64,
    lo_offset: u64,
    lo_sizelimit: u64,
    lo_number: u32,
    lo_encrypt_type: u32,
    lo_encrypt_key_size: u32,
    lo_flags: u32,
    lo_file_name: [u8; 64],
    lo_crypt_name: [u8; 64],
    lo_encrypt_key: [u8; 32],
    lo_init: [u64; 2],
}

/// A kernel loop device bound to a backing file.
///
/// Used to expose a local bundle or test fixture as a block device, e.g. as
/// the lower device of a [`VerityTarget`](crate::core::dm::VerityTarget).
/// Detached on drop.
#[derive(Debug)]
pub struct LoopDevice {
    device: File,
    path: PathBuf,
    attached: bool,
}

impl LoopDevice {
    /// Attaches `backing` to a free loop device, exposing its first
    /// `size_limit` bytes.
    pub fn attach(
        backing: &File,
        size_limit: u64,
        read_only: bool,
    ) -> Result<LoopDevice, LoopDeviceError> {
        let control = OpenOptions::new()
            .read(true)
            .write(true)
            .open(LOOP_CONTROL)
            .map_err(|e| attach_error(format!("failed to open {}: {}", LOOP_CONTROL, e)))?;

        let index = unsafe { libc::ioctl(control.as_raw_fd(), LOOP_CTL_GET_FREE) };
        if index < 0 {
            let e = io::Error::last_os_error();

            return Err(attach_error(format!(
                "no free loop device: {}",
                sys_utils::os_error_string(&e)
            )));
        }

        let path = PathBuf::from(format!("/dev/loop{index}"));
        log::debug!("LoopDevice::attach attaching backing file to {:?}", path);

        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| attach_error(format!("failed to open {:?}: {}", path, e)))?;

        let result =
            unsafe { libc::ioctl(device.as_raw_fd(), LOOP_SET_FD, backing.as_raw_fd()) };
        if result < 0 {
            let e = io::Error::last_os_error();

            return Err(attach_error(format!(
                "failed to bind backing file to {:?}: {}",
                path,
                sys_utils::os_error_string(&e)
            )));
        }

        let mut info: LoopInfo64 = unsafe { std::mem::zeroed() };
        info.lo_sizelimit = size_limit;
        if read_only {
            info.lo_flags |= LO_FLAGS_READ_ONLY;
        }

        let result = unsafe { libc::ioctl(device.as_raw_fd(), LOOP_SET_STATUS64, &info) };
        if result < 0 {
            let e = io::Error::last_os_error();
            unsafe { libc::ioctl(device.as_raw_fd(), LOOP_CLR_FD) };

            return Err(attach_error(format!(
                "failed to configure {:?}: {}",
                path,
                sys_utils::os_error_string(&e)
            )));
        }

        log::debug!("LoopDevice::attach {:?} is live", path);

        Ok(LoopDevice {
            device,
            path,
            attached: true,
        })
    }

    /// Returns the loop device's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detaches the backing file.
    pub fn detach(&mut self) -> Result<(), LoopDeviceError> {
        if !self.attached {
            return Ok(());
        }

        log::debug!("LoopDevice::detach detaching {:?}", self.path);

        let result = unsafe { libc::ioctl(self.device.as_raw_fd(), LOOP_CLR_FD) };
        if result < 0 {
            let e = io::Error::last_os_error();
            let err_msg = format!(
                "failed to detach {:?}: {}",
                self.path,
                sys_utils::os_error_string(&e)
            );
            log::debug!("LoopDevice::detach {}", err_msg);

            return Err(LoopDeviceError::Detach(err_msg));
        }

        self.attached = false;

        Ok(())
    }
}

impl Drop for LoopDevice {
    fn drop(&mut self) {
        if self.attached {
            if let Err(e) = self.detach() {
                log::error!("LoopDevice::drop {}", e);
            }
        }
    }
}

fn attach_error(err_msg: String) -> LoopDeviceError {
    log::debug!("LoopDevice::attach {}", err_msg);

    LoopDeviceError::Attach(err_msg)
}
