// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use uuid::Uuid;

// From standard library
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// From this library
use crate::core::chunk::{ChunkData, CHUNK_SIZE};
use crate::core::errors::VerityTargetError;
use crate::core::verity::VerityParams;
use crate::sys_utils;

const DM_CONTROL: &str = "/dev/mapper/control";
const DM_IOCTL_SIZE: usize = 312;
const DM_NAME_LEN: usize = 128;
const DM_UUID_LEN: usize = 129;

const DM_VERSION_MAJOR: u32 = 4;

const DM_VERSION: libc::c_ulong = dm_cmd(0);
const DM_DEV_CREATE: libc::c_ulong = dm_cmd(3);
const DM_DEV_REMOVE: libc::c_ulong = dm_cmd(4);
const DM_DEV_SUSPEND: libc::c_ulong = dm_cmd(6);
const DM_TABLE_LOAD: libc::c_ulong = dm_cmd(9);

const DM_READONLY_FLAG: u32 = 1 << 0;
const DM_DEFERRED_REMOVE: u32 = 1 << 17;

/// How long a busy non-deferred remove is retried before giving up.
const REMOVE_RETRIES: u32 = 5;
const REMOVE_BACKOFF: Duration = Duration::from_millis(100);

/// How long to wait for the kernel to publish the mapped device node.
const NODE_TIMEOUT: Duration = Duration::from_secs(10);

/// `_IOWR(0xfd, nr, struct dm_ioctl)`.
const fn dm_cmd(nr: libc::c_ulong) -> libc::c_ulong {
    (3 << 30) | ((DM_IOCTL_SIZE as libc::c_ulong) << 16) | (0xfd << 8) | nr
}

#[repr(C)]
#[derive(Clone, Copy)]
struct DmIoctl {
    version: [u32; 3],
    data_size: u32,
    data_start: u32,
    target_count: u32,
    open_count: i32,
    flags: u32,
    event_nr: u32,
    padding: u32,
    dev: u64,
    name: [u8; DM_NAME_LEN],
    uuid: [u8; DM_UUID_LEN],
    data: [u8; 7],
}

#[repr(C)]
#[derive(Clone, Copy)]
struct DmTargetSpec {
    sector_start: u64,
    length: u64,
    status: i32,
    next: u32,
    target_type: [u8; 16],
}

/// A dm-verity target: a lower block device and a signed root digest bound
/// into an authenticated upper block device.
///
/// Every 4 KiB read from the upper device is checked by the kernel against
/// the Merkle tree stored after the data region; a failing block surfaces as
/// `EIO`.
///
/// Dropping an active target removes it with deferred teardown, so the
/// mapping disappears once the last opener closes.
#[derive(Debug)]
pub struct VerityTarget {
    uuid: String,
    name: String,
    lower_dev: PathBuf,
    upper_dev: Option<PathBuf>,
    data_size: u64,
    root_digest_hex: String,
    salt_hex: String,
    active: bool,
}

impl VerityTarget {
    /// Creates an inactive target description. A fresh UUID names the kernel
    /// device.
    pub fn new<T>(lower_dev: T, params: &VerityParams) -> VerityTarget
    where
        T: AsRef<Path>,
    {
        let uuid = Uuid::new_v4().simple().to_string();
        let name = format!("rsupdate-{uuid}");

        VerityTarget {
            uuid,
            name,
            lower_dev: lower_dev.as_ref().to_path_buf(),
            upper_dev: None,
            data_size: params.data_size(),
            root_digest_hex: params.root_digest_hex(),
            salt_hex: params.salt_hex(),
            active: false,
        }
    }

    /// Returns the path of the authenticated upper device, once set up.
    pub fn upper_dev(&self) -> Option<&Path> {
        self.upper_dev.as_deref()
    }

    /// Returns the kernel name of the mapping.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Single-target verity table line submitted to the kernel. The hash
    /// tree starts immediately after the data region, so the hash start
    /// block equals the data block count.
    fn table_params(&self) -> String {
        let data_blocks = self.data_size / CHUNK_SIZE as u64;

        format!(
            "1 {} {} 4096 4096 {} {} sha256 {} {}",
            self.lower_dev.display(),
            self.lower_dev.display(),
            data_blocks,
            data_blocks,
            self.root_digest_hex,
            self.salt_hex
        )
    }

    /// Registers the target in the kernel: create, load the verity table,
    /// resume. On success the upper device path is valid and readable.
    pub fn setup(&mut self) -> Result<(), VerityTargetError> {
        log::debug!(
            "VerityTarget::setup creating mapping {:?} over {:?}",
            self.name,
            self.lower_dev
        );

        let control = open_control()?;
        check_interface_version(&control)?;

        let created = submit(
            &control,
            DM_DEV_CREATE,
            &header(&self.name, &self.uuid, 0),
            &[],
        )
        .map_err(|e| {
            let err_msg = format!(
                "failed to create device-mapper device {:?}: {}",
                self.name,
                sys_utils::os_error_string(&e)
            );
            log::debug!("VerityTarget::setup {}", err_msg);

            VerityTargetError::Setup(err_msg)
        })?;

        if let Err(e) = self.load_and_resume(&control) {
            // Partial setup: drop the fresh device before reporting.
            let _ = submit(&control, DM_DEV_REMOVE, &header(&self.name, "", 0), &[]);

            return Err(e);
        }

        let minor = device_minor(created.dev);
        let upper = PathBuf::from(format!("/dev/dm-{minor}"));
        wait_for_node(&upper).map_err(|e| {
            let err_msg = format!(
                "device node {:?} did not appear: {}",
                upper,
                sys_utils::os_error_string(&e)
            );

            VerityTargetError::Setup(err_msg)
        })?;

        log::debug!(
            "VerityTarget::setup mapping {:?} is live at {:?}",
            self.name,
            upper
        );
        self.upper_dev = Some(upper);
        self.active = true;

        Ok(())
    }

    fn load_and_resume(&self, control: &File) -> Result<(), VerityTargetError> {
        let mut payload = Vec::with_capacity(512);

        let params = self.table_params();
        let params_len = params.len() + 1;
        let padded = (std::mem::size_of::<DmTargetSpec>() + params_len + 7) & !7;

        let mut target_type = [0u8; 16];
        target_type[..b"verity".len()].copy_from_slice(b"verity");

        let spec = DmTargetSpec {
            sector_start: 0,
            length: self.data_size / 512,
            status: 0,
            next: padded as u32,
            target_type,
        };

        payload.extend_from_slice(unsafe {
            std::slice::from_raw_parts(
                &spec as *const DmTargetSpec as *const u8,
                std::mem::size_of::<DmTargetSpec>(),
            )
        });
        payload.extend_from_slice(params.as_bytes());
        payload.resize(padded, 0);

        let mut load_header = header(&self.name, "", DM_READONLY_FLAG);
        load_header.target_count = 1;

        submit(control, DM_TABLE_LOAD, &load_header, &payload).map_err(|e| {
            let err_msg = format!(
                "failed to load verity table for {:?}: {}",
                self.name,
                sys_utils::os_error_string(&e)
            );
            log::debug!("VerityTarget::setup {}", err_msg);

            VerityTargetError::Setup(err_msg)
        })?;

        submit(control, DM_DEV_SUSPEND, &header(&self.name, "", 0), &[]).map_err(|e| {
            let err_msg = format!(
                "failed to resume device-mapper device {:?}: {}",
                self.name,
                sys_utils::os_error_string(&e)
            );
            log::debug!("VerityTarget::setup {}", err_msg);

            VerityTargetError::Setup(err_msg)
        })?;

        Ok(())
    }

    /// Removes the mapping from the kernel.
    ///
    /// With `deferred`, the kernel tears the mapping down once the last
    /// opener closes. Without it, a busy mapping is retried with exponential
    /// backoff before [`VerityTargetError::Busy`] is reported.
    pub fn remove(&mut self, deferred: bool) -> Result<(), VerityTargetError> {
        if !self.active {
            return Ok(());
        }

        log::debug!(
            "VerityTarget::remove removing mapping {:?} (deferred: {})",
            self.name,
            deferred
        );

        let control = open_control()?;
        let flags = if deferred { DM_DEFERRED_REMOVE } else { 0 };

        let mut backoff = REMOVE_BACKOFF;
        let mut attempt = 0;
        loop {
            match submit(&control, DM_DEV_REMOVE, &header(&self.name, "", flags), &[]) {
                Ok(_) => break,
                Err(e) if e.raw_os_error() == Some(libc::EBUSY) && !deferred => {
                    attempt += 1;
                    if attempt >= REMOVE_RETRIES {
                        let err_msg = format!(
                            "device-mapper device {:?} still open after {} attempts",
                            self.name, attempt
                        );
                        log::debug!("VerityTarget::remove {}", err_msg);

                        return Err(VerityTargetError::Busy(err_msg));
                    }

                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(e) => {
                    let err_msg = format!(
                        "failed to remove device-mapper device {:?}: {}",
                        self.name,
                        sys_utils::os_error_string(&e)
                    );
                    log::debug!("VerityTarget::remove {}", err_msg);

                    return Err(VerityTargetError::Remove(err_msg));
                }
            }
        }

        self.active = false;

        Ok(())
    }

    /// Opens the upper device read-only and reads its first block, so a
    /// corrupt root surfaces here instead of deep inside a stream.
    pub fn open_checked(&self) -> Result<File, VerityTargetError> {
        let upper = self.upper_dev.as_ref().ok_or_else(|| {
            VerityTargetError::Setup(format!("mapping {:?} is not set up", self.name))
        })?;

        let file = File::open(upper)?;

        let mut probe = ChunkData::new();
        file.read_exact_at(&mut probe.0, 0).map_err(|e| {
            let err_msg = format!(
                "Check read from dm-verity device failed: {}",
                sys_utils::os_error_string(&e)
            );
            log::debug!("VerityTarget::open_checked {}", err_msg);

            VerityTargetError::CheckRead(err_msg)
        })?;

        Ok(file)
    }
}

impl Drop for VerityTarget {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.remove(true) {
                log::error!(
                    "VerityTarget::drop failed to remove mapping {:?}: {}",
                    self.name,
                    e
                );
            }
        }
    }
}

fn open_control() -> Result<File, VerityTargetError> {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(DM_CONTROL)
        .map_err(|e| {
            let err_msg = format!("failed to open {}: {}", DM_CONTROL, e);
            log::debug!("VerityTarget {}", err_msg);

            VerityTargetError::Setup(err_msg)
        })
}

fn check_interface_version(control: &File) -> Result<(), VerityTargetError> {
    let version = submit(control, DM_VERSION, &header("", "", 0), &[]).map_err(|e| {
        VerityTargetError::Setup(format!(
            "device-mapper version handshake failed: {}",
            sys_utils::os_error_string(&e)
        ))
    })?;

    if version.version[0] != DM_VERSION_MAJOR {
        let err_msg = format!(
            "unsupported device-mapper interface version {}.{}.{}",
            version.version[0], version.version[1], version.version[2]
        );

        return Err(VerityTargetError::Setup(err_msg));
    }

    Ok(())
}

fn header(name: &str, uuid: &str, flags: u32) -> DmIoctl {
    let mut hdr = DmIoctl {
        version: [DM_VERSION_MAJOR, 0, 0],
        data_size: 0,
        data_start: DM_IOCTL_SIZE as u32,
        target_count: 0,
        open_count: 0,
        flags,
        event_nr: 0,
        padding: 0,
        dev: 0,
        name: [0u8; DM_NAME_LEN],
        uuid: [0u8; DM_UUID_LEN],
        data: [0u8; 7],
    };

    hdr.name[..name.len().min(DM_NAME_LEN - 1)]
        .copy_from_slice(&name.as_bytes()[..name.len().min(DM_NAME_LEN - 1)]);
    hdr.uuid[..uuid.len().min(DM_UUID_LEN - 1)]
        .copy_from_slice(&uuid.as_bytes()[..uuid.len().min(DM_UUID_LEN - 1)]);

    hdr
}

/// Submits one device-mapper transaction and returns the kernel's response
/// header.
fn submit(
    control: &File,
    cmd: libc::c_ulong,
    hdr: &DmIoctl,
    payload: &[u8],
) -> io::Result<DmIoctl> {
    // Spare room lets the kernel return status without E2BIG.
    let mut buf = vec![0u8; DM_IOCTL_SIZE + payload.len().max(4096)];

    let mut hdr = *hdr;
    hdr.data_size = buf.len() as u32;

    unsafe {
        std::ptr::copy_nonoverlapping(
            &hdr as *const DmIoctl as *const u8,
            buf.as_mut_ptr(),
            DM_IOCTL_SIZE,
        );
    }
    buf[DM_IOCTL_SIZE..DM_IOCTL_SIZE + payload.len()].copy_from_slice(payload);

    let result = unsafe { libc::ioctl(control.as_raw_fd(), cmd, buf.as_mut_ptr()) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }

    let response = unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const DmIoctl) };

    Ok(response)
}

/// Decodes the minor number from the kernel's 64-bit device number encoding.
fn device_minor(dev: u64) -> u64 {
    (dev & 0xff) | ((dev >> 12) & !0xff)
}

fn wait_for_node(path: &Path) -> io::Result<()> {
    let start = Instant::now();
    while start.elapsed() < NODE_TIMEOUT {
        if path.exists() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    Err(io::Error::from_raw_os_error(libc::ENOENT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loopdev::LoopDevice;
    use crate::core::verity;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn verity_target_formats_the_kernel_table_line() -> crate::Result<()> {
        let params = VerityParams::from_hex(
            4096 * 129,
            "3049cbffaa49c6dc12e9cd1dd4604ef5a290e3d13b379c5a50d356e68423de23",
            "799ea94008bbdc6555d7895d1b647e2abfd213171f0e8b670e1da951406f4691",
        )?;
        let target = VerityTarget::new("/dev/loop7", &params);

        let actual = target.table_params();
        let expected = "1 /dev/loop7 /dev/loop7 4096 4096 129 129 sha256 \
                        3049cbffaa49c6dc12e9cd1dd4604ef5a290e3d13b379c5a50d356e68423de23 \
                        799ea94008bbdc6555d7895d1b647e2abfd213171f0e8b670e1da951406f4691";
        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn verity_target_names_are_unique() {
        let params =
            VerityParams::new(4096, [0u8; 32], [0u8; 32]).unwrap();

        let first = VerityTarget::new("/dev/loop0", &params);
        let second = VerityTarget::new("/dev/loop0", &params);

        assert_ne!(first.name(), second.name());
    }

    #[test]
    fn verity_target_decodes_kernel_device_numbers() {
        // minor 3 encodes plainly.
        assert_eq!(device_minor(3), 3);
        // minor 260 = 0x104: low byte 0x04, high bits shifted by 12.
        assert_eq!(device_minor((0x1 << 20) | 0x04), 260);
    }

    #[test]
    fn verity_target_ioctl_header_is_kernel_sized() {
        assert_eq!(std::mem::size_of::<DmIoctl>(), DM_IOCTL_SIZE);
        assert_eq!(std::mem::size_of::<DmTargetSpec>(), 40);
    }

    /// End-to-end kernel path: loop device, dm-verity mapping, authenticated
    /// reads, EIO on a flipped bit. Needs root and a device-mapper kernel.
    #[test]
    fn verity_target_authenticates_reads_through_the_kernel() -> crate::Result<()> {
        if !crate::sys_utils::is_root() || !Path::new(DM_CONTROL).exists() {
            return Ok(());
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.verity");

        // 129 data blocks, block i starts with the bytes 00 00 00 i.
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        let mut block = [0u8; CHUNK_SIZE];
        for i in 0..129u32 {
            block[..4].copy_from_slice(&[0, 0, 0, i as u8]);
            file.write_all(&block).unwrap();
        }

        let salt = [0x6bu8; 32];
        let hash = verity::create_hash(&file, 129, &salt)?;
        assert_eq!(hash.combined_blocks, 132);

        let params = VerityParams::new(4096 * 129, hash.root_digest, salt)?;

        let run = |expect_bad: Option<u64>| -> crate::Result<()> {
            let loopdev = LoopDevice::attach(&file, 4096 * 132, true)?;
            let mut target = VerityTarget::new(loopdev.path(), &params);
            target.setup()?;

            let upper = target.open_checked()?;
            target.remove(true)?;

            let mut readable = 0u64;
            let mut buf = [0u8; CHUNK_SIZE];
            for i in 0..129u64 {
                match upper.read_exact_at(&mut buf, i * CHUNK_SIZE as u64) {
                    Ok(()) => {
                        assert_eq!(&buf[..4], &[0, 0, 0, i as u8][..]);
                        readable += 1;
                    }
                    Err(e) => {
                        assert_eq!(e.raw_os_error(), Some(libc::EIO));
                        assert_eq!(Some(i), expect_bad);
                    }
                }
            }

            let expected = 129 - expect_bad.map(|_| 1).unwrap_or(0);
            assert_eq!(readable, expected);

            Ok(())
        };

        run(None)?;

        // Flip one bit in block 127; only that sector turns unreadable.
        let mut byte = [0u8; 1];
        file.read_exact_at(&mut byte, 4096 * 127).unwrap();
        byte[0] ^= 0x01;
        file.write_all_at(&byte, 4096 * 127).unwrap();
        file.sync_all().unwrap();

        assert!(verity::verify_hash(&file, 129, &salt, &hash.root_digest).is_err());
        run(Some(127))?;

        Ok(())
    }
}
