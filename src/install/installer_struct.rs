// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// From this library
use crate::config::ConfigError;
use crate::core::chunk::{hash_chunk, Chunk, CHUNK_SIZE, ZERO_CHUNK_HASH};
use crate::core::dm::VerityTarget;
use crate::core::errors::{HashIndexError, SlotError};
use crate::core::index::HashIndex;
use crate::core::nbd::NbdServer;
use crate::core::slot::{AccessMode, Slot};
use crate::install::{ImageReport, ImageSpec, InstallContext, InstallReport, InstallerError, Manifest};

/// Chunks moved during one image stream.
#[derive(Debug, Default)]
struct StreamOutcome {
    reused: u64,
    fetched: u64,
    zeroed: u64,
}

/// The streaming installer.
///
/// Composes the network block device, the dm-verity layer and the chunk
/// hash index into a slot update: for every 4 KiB chunk of the image,
/// either a matching chunk is copied from local disk, or the chunk is read
/// through the authenticated source device. Only novel chunks traverse the
/// network.
///
/// Within one install, chunks are written in strictly increasing order with
/// a single writer per target slot; the target is fsynced before the
/// bootloader learns anything, and the bootloader's good/primary calls
/// happen exclusively on the success path.
#[derive(Debug)]
pub struct Installer {
    context: InstallContext,
}

impl Installer {
    /// Creates an installer over an explicit context.
    pub fn new(context: InstallContext) -> Installer {
        Installer { context }
    }

    /// Returns the install context.
    pub fn context(&self) -> &InstallContext {
        &self.context
    }

    /// Returns the install context mutably.
    pub fn context_mut(&mut self) -> &mut InstallContext {
        &mut self.context
    }

    /// Installs every image of `manifest` from the bundle at `bundle_url`,
    /// sequentially, in manifest order.
    pub fn install(
        &mut self,
        manifest: &Manifest,
        bundle_url: &str,
    ) -> Result<InstallReport, InstallerError> {
        log::info!(
            "Installer::install installing bundle version {:?} from {:?}",
            manifest.version(),
            bundle_url
        );

        manifest.check_compatible(self.context.config().compatible())?;

        let mut report = InstallReport::default();
        for image in manifest.images() {
            self.check_cancelled("before starting the next image")?;
            report.images.push(self.install_image(image, bundle_url)?);
        }

        Ok(report)
    }

    fn check_cancelled(&self, when: &str) -> Result<(), InstallerError> {
        if self.context.is_cancelled() {
            let err_msg = format!("install cancelled {when}");
            log::info!("Installer {}", err_msg);

            return Err(InstallerError::Cancelled(err_msg));
        }

        Ok(())
    }

    /// Opens the authenticated source for one image and streams it. Kernel
    /// resources tear down in reverse of setup on every path.
    fn install_image(
        &self,
        image: &ImageSpec,
        bundle_url: &str,
    ) -> Result<ImageReport, InstallerError> {
        image.validate()?;

        let slot = self
            .context
            .config()
            .slot(image.target_slot())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "manifest targets unknown slot {:?}",
                    image.target_slot()
                ))
            })?
            .clone();

        log::info!(
            "Installer::install_image streaming {} chunks into slot {:?}",
            image.size_blocks(),
            slot.name()
        );

        let mut server = NbdServer::builder().url(bundle_url).build();
        server.start()?;
        let lower = server.attach()?.to_path_buf();

        let mut verity = VerityTarget::new(&lower, image.verity());
        verity.setup()?;

        let stream_result = (|| {
            let source = verity.open_checked()?;
            // The open descriptor keeps the mapping alive; the kernel tears
            // it down once the last opener closes.
            verity.remove(true)?;

            self.stream_image(image, &slot, &source)
        })();

        let stop_result = server.stop();

        match stream_result {
            Ok(report) => {
                stop_result?;

                Ok(report)
            }
            Err(e) => {
                log::error!(
                    "Installer::install_image install into slot {:?} failed: {}",
                    slot.name(),
                    e
                );

                Err(e)
            }
        }
    }

    /// Steps 2–7 of an image install, over an already-authenticated source
    /// descriptor.
    fn stream_image(
        &self,
        image: &ImageSpec,
        slot: &Slot,
        source: &File,
    ) -> Result<ImageReport, InstallerError> {
        let source_data = Arc::new(source.try_clone()?);
        let mut source_index = match image.hashes_path() {
            Some(path) => {
                HashIndex::open(format!("{} source", slot.name()), source_data, path)?
            }
            None => HashIndex::build(
                format!("{} source", slot.name()),
                source_data,
                image.size_blocks(),
            )?,
        };
        // The source is read through dm-verity; verity is the oracle.
        source_index.set_skip_hash_check(true);

        let needed = image.size_blocks() as u64 * CHUNK_SIZE as u64;
        let available = slot.size()?;
        if available < needed {
            return Err(SlotError::Size(format!(
                "slot {:?} holds {} bytes, image needs {}",
                slot.name(),
                available,
                needed
            ))
            .into());
        }

        let mut target_index = HashIndex::open_for_slot(
            format!("{} target", slot.name()),
            slot,
            AccessMode::ReadWrite,
        )?;
        let target = target_index.data();

        let cancel = self.context.cancel_handle();
        let outcome = Self::stream_to_slot(
            source,
            &source_index,
            &target,
            &mut target_index,
            slot,
            &cancel,
        )?;

        if self.context.verify_after_write() {
            Self::verify_slot(&target, &source_index)?;
        }

        // Warm sidecar for the next delta run. Losing it costs bandwidth,
        // not correctness.
        match HashIndex::reuse(
            format!("{} updated", slot.name()),
            &source_index,
            Arc::clone(&target),
        ) {
            Ok(updated) => {
                if let Err(e) = updated.export_for_slot(slot, image.checksum()) {
                    log::warn!(
                        "Installer::stream_image failed to export the hash sidecar for {:?}: {}",
                        slot.name(),
                        e
                    );
                }
            }
            Err(e) => {
                log::warn!(
                    "Installer::stream_image failed to derive the new index for {:?}: {}",
                    slot.name(),
                    e
                );
            }
        }

        self.context.boot().set_state(slot, true)?;
        self.context.boot().set_primary(slot)?;

        log::info!(
            "Installer::stream_image slot {:?} updated: {} reused, {} fetched, {} zeroed",
            slot.name(),
            outcome.reused,
            outcome.fetched,
            outcome.zeroed
        );

        Ok(ImageReport {
            slot: slot.name().to_owned(),
            blocks: source_index.count(),
            reused: outcome.reused,
            fetched: outcome.fetched,
            zeroed: outcome.zeroed,
        })
    }

    /// The reuse-or-fetch loop. One chunk at a time, strictly increasing,
    /// single writer; the lower watermark chases the write cursor so stale
    /// target content is never reused.
    fn stream_to_slot(
        source: &File,
        source_index: &HashIndex,
        target: &File,
        target_index: &mut HashIndex,
        slot: &Slot,
        cancel: &AtomicBool,
    ) -> Result<StreamOutcome, InstallerError> {
        let count = source_index.count();
        let trim_capable = slot.is_trim_capable(target);
        let mut chunk = Chunk::new();
        let mut outcome = StreamOutcome::default();

        for n in 0..count {
            if cancel.load(Ordering::Relaxed) {
                let err_msg = format!("install cancelled at chunk {n} of {count}");
                log::info!("Installer::stream_to_slot {}", err_msg);

                return Err(InstallerError::Cancelled(err_msg));
            }

            let offset = n as u64 * CHUNK_SIZE as u64;
            let wanted = source_index.chunk_hash(n);

            if wanted == ZERO_CHUNK_HASH && trim_capable {
                slot.discard(target, offset, CHUNK_SIZE as u64)?;
                outcome.zeroed += 1;
            } else {
                match target_index.get_chunk(&wanted, &mut chunk) {
                    Ok(_) => {
                        target.write_all_at(&chunk.data.0, offset)?;
                        outcome.reused += 1;
                    }
                    Err(HashIndexError::NotFound(_)) | Err(HashIndexError::Modified(_)) => {
                        source.read_exact_at(&mut chunk.data.0, offset)?;
                        target.write_all_at(&chunk.data.0, offset)?;
                        outcome.fetched += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            target_index.set_invalid_below(n + 1);
        }

        target.sync_all()?;

        Ok(outcome)
    }

    /// Re-reads the written slot and compares every chunk hash against the
    /// source index.
    fn verify_slot(target: &File, source_index: &HashIndex) -> Result<(), InstallerError> {
        let mut chunk = Chunk::new();

        for n in 0..source_index.count() {
            target.read_exact_at(&mut chunk.data.0, n as u64 * CHUNK_SIZE as u64)?;

            if hash_chunk(&chunk.data.0) != source_index.chunk_hash(n) {
                let err_msg = format!("slot content mismatch in chunk {n} after install");
                log::debug!("Installer::verify_slot {}", err_msg);

                return Err(InstallerError::Verify(err_msg));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::BootChooser;
    use crate::config::Config;
    use crate::core::chunk::ChunkData;
    use crate::core::verity::VerityParams;
    use crate::install::ManifestError;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::path::Path;

    /// Deterministic, pairwise-distinct chunk content. Never the zero page.
    fn pattern_chunk(n: u32) -> ChunkData {
        let mut chunk = ChunkData::new();
        for (j, byte) in chunk.0.iter_mut().enumerate() {
            *byte = n
                .wrapping_mul(2246822519)
                .wrapping_add(j as u32)
                .wrapping_mul(2654435761)
                .to_be_bytes()[3];
        }
        chunk.0[0] = 0xc3;

        chunk
    }

    fn filler_chunk() -> ChunkData {
        let mut chunk = ChunkData::new();
        chunk.0.fill(0xee);

        chunk
    }

    /// Writes a source of `blocks` chunks and opens its index the way the
    /// installer does: streamed, hash check skipped.
    fn source_fixture(
        dir: &Path,
        blocks: u32,
        content: impl Fn(u32) -> ChunkData,
    ) -> (File, HashIndex) {
        let path = dir.join("source.img");
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .unwrap();
        for n in 0..blocks {
            file.write_all(&content(n).0).unwrap();
        }

        let mut index =
            HashIndex::build("source", Arc::new(file.try_clone().unwrap()), blocks).unwrap();
        index.set_skip_hash_check(true);

        (file, index)
    }

    /// Writes a target slot file of `blocks` chunks and returns its record.
    fn target_fixture(
        dir: &Path,
        blocks: u32,
        content: impl Fn(u32) -> ChunkData,
    ) -> Slot {
        let path = dir.join("rootfs.1.img");
        let mut file = File::create(&path).unwrap();
        for n in 0..blocks {
            file.write_all(&content(n).0).unwrap();
        }

        Slot::builder()
            .name("rootfs.1")
            .class("rootfs")
            .device(path)
            .build()
    }

    fn stream(
        source: &File,
        source_index: &HashIndex,
        slot: &Slot,
    ) -> Result<(StreamOutcome, HashIndex), InstallerError> {
        let mut target_index =
            HashIndex::open_for_slot("target", slot, AccessMode::ReadWrite)?;
        let target = target_index.data();
        let cancel = AtomicBool::new(false);

        let outcome = Installer::stream_to_slot(
            source,
            source_index,
            &target,
            &mut target_index,
            slot,
            &cancel,
        )?;

        Ok((outcome, target_index))
    }

    fn assert_slot_matches_source(slot: &Slot, source: &File, blocks: u32) {
        let target = File::open(slot.device()).unwrap();
        let mut expected = ChunkData::new();
        let mut actual = ChunkData::new();

        for n in 0..blocks {
            let offset = n as u64 * CHUNK_SIZE as u64;
            source.read_exact_at(&mut expected.0, offset).unwrap();
            target.read_exact_at(&mut actual.0, offset).unwrap();
            assert_eq!(actual.0, expected.0, "chunk {n} differs");
        }
    }

    #[test]
    fn installer_reuses_preseeded_target_chunks() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let blocks = 100;
        let (source, source_index) = source_fixture(dir.path(), blocks, pattern_chunk);

        // 70 of 100 chunks already sit in the slot; the rest is filler.
        let slot = target_fixture(dir.path(), blocks, |n| {
            if n % 10 < 7 {
                pattern_chunk(n)
            } else {
                filler_chunk()
            }
        });

        let (outcome, target_index) = stream(&source, &source_index, &slot)?;

        assert_eq!(outcome.reused, 70);
        assert_eq!(outcome.fetched, 30);
        assert_eq!(outcome.zeroed, 0);
        assert_eq!(target_index.stats().hits(), 70);
        assert_eq!(target_index.stats().misses(), 30);
        // Watermark ends at the chunk count.
        assert_eq!(target_index.invalid_below(), blocks);

        assert_slot_matches_source(&slot, &source, blocks);

        Ok(())
    }

    #[test]
    fn installer_resumes_after_a_partial_write() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let blocks = 80;
        let (source, source_index) = source_fixture(dir.path(), blocks, pattern_chunk);

        // A previous run died after half the chunks.
        let slot = target_fixture(dir.path(), blocks, |n| {
            if n < 40 {
                pattern_chunk(n)
            } else {
                filler_chunk()
            }
        });

        let (outcome, _) = stream(&source, &source_index, &slot)?;

        // The re-run pays only for the missing half.
        assert_eq!(outcome.reused, 40);
        assert_eq!(outcome.fetched, 40);

        assert_slot_matches_source(&slot, &source, blocks);

        Ok(())
    }

    #[test]
    fn installer_discards_zero_chunks_on_a_trim_capable_slot() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let blocks = 32;
        let (source, source_index) = source_fixture(dir.path(), blocks, |n| {
            if n % 2 == 0 {
                ChunkData::new()
            } else {
                pattern_chunk(n)
            }
        });

        let slot = target_fixture(dir.path(), blocks, |_| filler_chunk());

        let (outcome, _) = stream(&source, &source_index, &slot)?;

        assert_eq!(outcome.zeroed, 16);
        assert_eq!(outcome.fetched, 16);
        assert_eq!(outcome.reused, 0);

        assert_slot_matches_source(&slot, &source, blocks);

        Ok(())
    }

    #[test]
    fn installer_cancellation_stops_before_the_first_chunk() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let blocks = 8;
        let (source, source_index) = source_fixture(dir.path(), blocks, pattern_chunk);
        let slot = target_fixture(dir.path(), blocks, |_| filler_chunk());

        let mut target_index =
            HashIndex::open_for_slot("target", &slot, AccessMode::ReadWrite)?;
        let target = target_index.data();
        let cancel = AtomicBool::new(true);

        let actual = Installer::stream_to_slot(
            &source,
            &source_index,
            &target,
            &mut target_index,
            &slot,
            &cancel,
        );
        assert!(matches!(actual, Err(InstallerError::Cancelled(_))));

        // Nothing was written.
        let unchanged = File::open(slot.device()).unwrap();
        let mut buf = ChunkData::new();
        unchanged.read_exact_at(&mut buf.0, 0).unwrap();
        assert_eq!(buf.0, filler_chunk().0);

        Ok(())
    }

    #[test]
    fn installer_verify_catches_a_corrupted_slot() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let blocks = 12;
        let (source, source_index) = source_fixture(dir.path(), blocks, pattern_chunk);
        let slot = target_fixture(dir.path(), blocks, |_| filler_chunk());

        let (_, target_index) = stream(&source, &source_index, &slot)?;
        let target = target_index.data();

        Installer::verify_slot(&target, &source_index)?;

        // One flipped byte in chunk 5 must surface.
        let writer = std::fs::OpenOptions::new()
            .write(true)
            .open(slot.device())
            .unwrap();
        writer.write_all_at(&[0x00], 5 * CHUNK_SIZE as u64 + 17).unwrap();

        let actual = Installer::verify_slot(&target, &source_index);
        assert!(matches!(actual, Err(InstallerError::Verify(_))));

        Ok(())
    }

    #[test]
    fn installer_stream_image_runs_the_full_slot_sequence() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let blocks = 24;
        let (source, source_index) = source_fixture(dir.path(), blocks, pattern_chunk);
        drop(source_index);

        let slot = target_fixture(dir.path(), blocks, |_| filler_chunk());

        let config = Config::builder()
            .compatible("vendor-board-v1")
            .slot(slot.clone())
            .build();
        let mut context = InstallContext::new(Arc::new(config), BootChooser::noop());
        context.set_verify_after_write(true);
        let installer = Installer::new(context);

        let checksum = [0x42u8; 32];
        let verity =
            VerityParams::new(blocks as u64 * 4096, [0u8; 32], [0u8; 32]).unwrap();
        let image = ImageSpec::builder()
            .checksum(checksum)
            .size_blocks(blocks)
            .verity(verity)
            .target_slot("rootfs.1")
            .build();

        let report = installer.stream_image(&image, &slot, &source)?;

        assert_eq!(report.blocks, blocks);
        assert_eq!(report.reused + report.fetched + report.zeroed, blocks as u64);
        assert_slot_matches_source(&slot, &source, blocks);

        // Success path: the slot is good and primary.
        let boot = installer.context().boot();
        assert!(boot.get_state(&slot)?.good);
        assert_eq!(boot.get_primary()?, "rootfs.1");

        // The checksum-named sidecar was exported for the next delta run.
        assert!(slot.hashes_path_for_checksum(&checksum).exists());

        Ok(())
    }

    #[test]
    fn installer_rejects_a_slot_smaller_than_the_image() -> crate::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let (source, _) = source_fixture(dir.path(), 8, pattern_chunk);
        let slot = target_fixture(dir.path(), 4, |_| filler_chunk());

        let config = Config::builder()
            .compatible("vendor-board-v1")
            .slot(slot.clone())
            .build();
        let context = InstallContext::new(Arc::new(config), BootChooser::noop());
        let installer = Installer::new(context);

        let verity = VerityParams::new(8 * 4096, [0u8; 32], [0u8; 32]).unwrap();
        let image = ImageSpec::builder()
            .checksum([0u8; 32])
            .size_blocks(8)
            .verity(verity)
            .target_slot("rootfs.1")
            .build();

        let actual = installer.stream_image(&image, &slot, &source);
        assert!(matches!(
            actual,
            Err(InstallerError::Slot(SlotError::Size(_)))
        ));

        Ok(())
    }

    #[test]
    fn installer_rejects_an_incompatible_manifest() {
        let config = Config::builder().compatible("vendor-board-v1").build();
        let context = InstallContext::new(Arc::new(config), BootChooser::noop());
        let mut installer = Installer::new(context);

        let manifest = Manifest::builder()
            .compatible("other-board")
            .version("2024.03")
            .build();

        let actual = installer.install(&manifest, "https://updates.example.com/update.bundle");
        assert!(matches!(
            actual,
            Err(InstallerError::Manifest(ManifestError::Incompatible(_)))
        ));
    }

    #[test]
    fn installer_rejects_an_unknown_target_slot() {
        let config = Config::builder().compatible("vendor-board-v1").build();
        let context = InstallContext::new(Arc::new(config), BootChooser::noop());
        let mut installer = Installer::new(context);

        let verity = VerityParams::new(4096, [0u8; 32], [0u8; 32]).unwrap();
        let manifest = Manifest::builder()
            .compatible("vendor-board-v1")
            .version("2024.03")
            .images(vec![ImageSpec::builder()
                .checksum([0u8; 32])
                .size_blocks(1)
                .verity(verity)
                .target_slot("rootfs.9")
                .build()])
            .build();

        let actual = installer.install(&manifest, "https://updates.example.com/update.bundle");
        assert!(matches!(
            actual,
            Err(InstallerError::Config(ConfigError::Invalid(_)))
        ));
    }
}
