// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use typed_builder::TypedBuilder;

// From standard library
use std::path::{Path, PathBuf};

// From this library
use crate::core::chunk::ChunkHash;
use crate::core::verity::VerityParams;
use crate::install::ManifestError;

/// In-bundle descriptor: images, checksums, verity parameters, target
/// slots.
///
/// Signature verification happens in the bundle collaborator before a
/// manifest reaches the installer; the verity root digests in here are
/// trusted by that point.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Manifest {
    /// System the bundle targets; must equal the configured compatible.
    #[builder(setter(into))]
    compatible: String,

    /// Bundle version, used by the poll criteria.
    #[builder(setter(into))]
    version: String,

    /// Images, installed in declaration order.
    #[builder(default)]
    images: Vec<ImageSpec>,
}

impl Manifest {
    /// Returns the compatible identifier the bundle targets.
    pub fn compatible(&self) -> &str {
        &self.compatible
    }

    /// Returns the bundle version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the images in declaration order.
    pub fn images(&self) -> &[ImageSpec] {
        &self.images
    }

    /// Checks the manifest against the configured compatible string.
    pub fn check_compatible(&self, system_compatible: &str) -> Result<(), ManifestError> {
        if self.compatible != system_compatible {
            let err_msg = format!(
                "bundle is for {:?}, this system is {:?}",
                self.compatible, system_compatible
            );
            log::debug!("Manifest::check_compatible {}", err_msg);

            return Err(ManifestError::Incompatible(err_msg));
        }

        Ok(())
    }
}

/// One image of a bundle: payload identity, size, verity binding,
/// destination slot.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ImageSpec {
    /// SHA-256 of the payload.
    checksum: ChunkHash,

    /// Payload size, in 4 KiB chunks.
    size_blocks: u32,

    /// Verity parameters authenticating the payload.
    verity: VerityParams,

    /// Extracted hash sidecar of the payload, when the bundle carries one.
    #[builder(default, setter(into, strip_option))]
    hashes_path: Option<PathBuf>,

    /// Name of the slot this image installs into.
    #[builder(setter(into))]
    target_slot: String,
}

impl ImageSpec {
    /// Returns the SHA-256 of the payload.
    pub fn checksum(&self) -> &ChunkHash {
        &self.checksum
    }

    /// Returns the payload size, in 4 KiB chunks.
    pub fn size_blocks(&self) -> u32 {
        self.size_blocks
    }

    /// Returns the verity parameters.
    pub fn verity(&self) -> &VerityParams {
        &self.verity
    }

    /// Returns the extracted hash sidecar path, if any.
    pub fn hashes_path(&self) -> Option<&Path> {
        self.hashes_path.as_deref()
    }

    /// Returns the destination slot name.
    pub fn target_slot(&self) -> &str {
        &self.target_slot
    }

    /// Checks the image record for internal consistency.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.verity.data_blocks() != self.size_blocks as u64 {
            let err_msg = format!(
                "image for slot {:?}: verity covers {} blocks, image declares {}",
                self.target_slot,
                self.verity.data_blocks(),
                self.size_blocks
            );

            return Err(ManifestError::Invalid(err_msg));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn image(size_blocks: u32, verity_blocks: u64) -> ImageSpec {
        let verity =
            VerityParams::new(verity_blocks * 4096, [0u8; 32], [0u8; 32]).unwrap();

        ImageSpec::builder()
            .checksum([0u8; 32])
            .size_blocks(size_blocks)
            .verity(verity)
            .target_slot("rootfs.1")
            .build()
    }

    #[test]
    fn manifest_accepts_a_matching_compatible() -> crate::Result<()> {
        let manifest = Manifest::builder()
            .compatible("vendor-board-v1")
            .version("2024.03")
            .build();

        manifest.check_compatible("vendor-board-v1")?;

        Ok(())
    }

    #[test]
    fn manifest_rejects_a_foreign_compatible() {
        let manifest = Manifest::builder()
            .compatible("vendor-board-v2")
            .version("2024.03")
            .build();

        let actual = manifest.check_compatible("vendor-board-v1");
        assert!(matches!(actual, Err(ManifestError::Incompatible(_))));
    }

    #[test]
    fn image_spec_validate_ties_verity_to_the_declared_size() {
        assert!(image(8, 8).validate().is_ok());

        let actual = image(8, 9).validate();
        assert!(matches!(actual, Err(ManifestError::Invalid(_))));
    }

    #[test]
    fn manifest_keeps_images_in_declaration_order() {
        let manifest = Manifest::builder()
            .compatible("vendor-board-v1")
            .version("2024.03")
            .images(vec![image(1, 1), image(2, 2)])
            .build();

        let actual: Vec<u32> = manifest.images().iter().map(ImageSpec::size_blocks).collect();
        let expected = vec![1, 2];
        assert_eq!(actual, expected);
    }
}
