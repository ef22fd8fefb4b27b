// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use typed_builder::TypedBuilder;

// From standard library
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

// From this library
use crate::core::chunk::ChunkHash;
use crate::core::errors::SlotError;
use crate::core::slot::AccessMode;
use crate::sys_utils;

/// `BLKZEROOUT`: zero a byte range on a block device, discarding where the
/// hardware allows it.
const BLKZEROOUT: libc::c_ulong = 0x127f;

/// A block device on the target that can hold a runnable root filesystem.
///
/// Slots come in pairs (A/B); the bootloader selects which one to boot. The
/// `parent` field holds the *name* of another slot, resolved against the slot
/// catalog in a second pass; it is never an owning link.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Slot {
    /// Slot name, e.g. `rootfs.0`.
    #[builder(setter(into))]
    name: String,

    /// Slot class shared by the members of an A/B pair, e.g. `rootfs`.
    #[builder(setter(into))]
    class: String,

    /// Path to the slot's block device.
    #[builder(setter(into))]
    device: PathBuf,

    /// Slot type. Defaults to `raw`.
    #[builder(default = String::from("raw"), setter(into))]
    slot_type: String,

    /// Name under which the bootloader knows this slot. Defaults to the slot
    /// name.
    #[builder(default, setter(into, strip_option))]
    bootname: Option<String>,

    /// Refuses read-write access when set.
    #[builder(default)]
    readonly: bool,

    /// Name of the parent slot, if any.
    #[builder(default, setter(into, strip_option))]
    parent: Option<String>,

    /// SHA-256 of the slot's current payload, when known. Used to pick the
    /// checksum-named hash sidecar.
    #[builder(default, setter(strip_option))]
    checksum: Option<ChunkHash>,
}

impl Slot {
    /// Returns the slot's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the slot's class.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Returns the path to the slot's block device.
    pub fn device(&self) -> &PathBuf {
        &self.device
    }

    /// Returns the slot's type.
    pub fn slot_type(&self) -> &str {
        &self.slot_type
    }

    /// Returns the name under which the bootloader knows this slot.
    pub fn bootname(&self) -> &str {
        self.bootname.as_deref().unwrap_or(&self.name)
    }

    /// Returns `true` when the slot refuses read-write access.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Returns the name of the parent slot, if any.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Returns the SHA-256 of the slot's current payload, when known.
    pub fn checksum(&self) -> Option<&ChunkHash> {
        self.checksum.as_ref()
    }

    /// Records the SHA-256 of the slot's current payload.
    pub fn set_checksum(&mut self, checksum: ChunkHash) {
        self.checksum = Some(checksum);
    }

    /// Opens the slot's block device.
    ///
    /// Read-write opens try `O_DIRECT` first, and fall back to a buffered
    /// open on file systems that do not support it.
    pub fn open(&self, mode: AccessMode) -> Result<File, SlotError> {
        log::debug!("Slot::open opening slot {:?} ({:?})", self.name, mode);

        match mode {
            AccessMode::ReadOnly => {
                File::open(&self.device).map_err(|e| self.open_error(&e))
            }
            AccessMode::ReadWrite if self.readonly => {
                let err_msg = format!("slot {:?} is configured read-only", self.name);
                log::debug!("Slot::open {}", err_msg);

                Err(SlotError::Open(err_msg))
            }
            AccessMode::ReadWrite => {
                let direct = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .custom_flags(libc::O_DIRECT)
                    .open(&self.device);

                match direct {
                    Ok(file) => Ok(file),
                    Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                        log::debug!(
                            "Slot::open O_DIRECT not supported on {:?}, falling back to buffered I/O",
                            self.device
                        );

                        OpenOptions::new()
                            .read(true)
                            .write(true)
                            .open(&self.device)
                            .map_err(|e| self.open_error(&e))
                    }
                    Err(e) => Err(self.open_error(&e)),
                }
            }
        }
    }

    fn open_error(&self, err: &io::Error) -> SlotError {
        let err_msg = format!(
            "failed to open slot {:?} device {:?}: {}",
            self.name, self.device, err
        );
        log::debug!("Slot::open {}", err_msg);

        SlotError::Open(err_msg)
    }

    /// Returns the slot's size in bytes.
    pub fn size(&self) -> Result<u64, SlotError> {
        let file = File::open(&self.device).map_err(|e| self.open_error(&e))?;

        sys_utils::device_size(&file).map_err(SlotError::from)
    }

    /// Returns `true` when the slot's device can drop whole chunks without an
    /// explicit write: hole punching on regular files, zero-out on block
    /// devices.
    pub fn is_trim_capable(&self, file: &File) -> bool {
        match file.metadata() {
            Ok(metadata) => metadata.file_type().is_block_device() || metadata.is_file(),
            Err(_) => false,
        }
    }

    /// Zeroes `length` bytes at `offset`, releasing the underlying storage
    /// where the device supports it.
    ///
    /// Readers observe zeroes afterwards on every path.
    pub fn discard(&self, file: &File, offset: u64, length: u64) -> Result<(), SlotError> {
        let metadata = file.metadata().map_err(SlotError::from)?;

        let result = if metadata.file_type().is_block_device() {
            let range: [u64; 2] = [offset, length];
            unsafe { libc::ioctl(file.as_raw_fd(), BLKZEROOUT, range.as_ptr()) }
        } else {
            unsafe {
                libc::fallocate(
                    file.as_raw_fd(),
                    libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
                    offset as libc::off_t,
                    length as libc::off_t,
                )
            }
        };

        match result {
            0 => Ok(()),
            _ => {
                let err = io::Error::last_os_error();
                let err_msg = format!(
                    "failed to discard {} bytes at offset {} on slot {:?}: {}",
                    length, offset, self.name, err
                );
                log::debug!("Slot::discard {}", err_msg);

                Err(SlotError::Discard(err_msg))
            }
        }
    }

    /// Returns the path of the slot's plain hash sidecar, `<device>.hashes`.
    pub fn hashes_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.hashes", self.device.display()))
    }

    /// Returns the path of a checksum-named hash sidecar,
    /// `<device>.<payload sha256>.hashes`. A stale sidecar is self-evident:
    /// its name no longer matches the payload.
    pub fn hashes_path_for_checksum(&self, checksum: &ChunkHash) -> PathBuf {
        PathBuf::from(format!(
            "{}.{}.hashes",
            self.device.display(),
            hex::encode(checksum)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{Read, Seek, SeekFrom, Write};

    fn tmp_slot(dir: &std::path::Path, name: &str) -> Slot {
        Slot::builder()
            .name(name)
            .class("rootfs")
            .device(dir.join(name))
            .build()
    }

    #[test]
    fn slot_defaults_match_the_config_surface() {
        let slot = Slot::builder()
            .name("rootfs.0")
            .class("rootfs")
            .device("/dev/null")
            .build();

        assert_eq!(slot.slot_type(), "raw");
        assert_eq!(slot.bootname(), "rootfs.0");
        assert!(!slot.is_readonly());
        assert!(slot.parent().is_none());
    }

    #[test]
    fn slot_bootname_overrides_the_slot_name() {
        let slot = Slot::builder()
            .name("rootfs.0")
            .class("rootfs")
            .device("/dev/null")
            .bootname("A")
            .build();

        assert_eq!(slot.bootname(), "A");
    }

    #[test]
    fn slot_refuses_to_open_a_readonly_slot_for_writing() {
        let slot = Slot::builder()
            .name("rescue.0")
            .class("rescue")
            .device("/dev/null")
            .readonly(true)
            .build();

        let actual = slot.open(AccessMode::ReadWrite);
        assert!(matches!(actual, Err(SlotError::Open(_))));
    }

    #[test]
    fn slot_sidecar_paths_follow_the_naming_conventions() {
        let slot = Slot::builder()
            .name("rootfs.1")
            .class("rootfs")
            .device("/data/rootfs.1.img")
            .build();

        let actual = slot.hashes_path();
        let expected = PathBuf::from("/data/rootfs.1.img.hashes");
        assert_eq!(actual, expected);

        let checksum = [0xabu8; 32];
        let actual = slot.hashes_path_for_checksum(&checksum);
        let expected = PathBuf::from(format!("/data/rootfs.1.img.{}.hashes", "ab".repeat(32)));
        assert_eq!(actual, expected);
    }

    #[test]
    fn slot_discard_zeroes_a_region_of_a_regular_file() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let slot = tmp_slot(dir.path(), "rootfs.0");

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(slot.device())
            .unwrap();
        file.write_all(&[0xffu8; 8192]).unwrap();

        slot.discard(&file, 4096, 4096)?;

        let mut content = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut content).unwrap();

        assert_eq!(&content[..4096], &[0xffu8; 4096][..]);
        assert_eq!(&content[4096..], &[0u8; 4096][..]);

        Ok(())
    }

    #[test]
    fn slot_size_reports_a_regular_file_length() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let slot = tmp_slot(dir.path(), "rootfs.0");

        let mut file = File::create(slot.device()).unwrap();
        file.write_all(&[0u8; 12288]).unwrap();

        let actual = slot.size()?;
        let expected = 12288;
        assert_eq!(actual, expected);

        Ok(())
    }
}
