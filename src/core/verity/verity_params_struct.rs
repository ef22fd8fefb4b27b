// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library
use crate::core::chunk::{ChunkHash, CHUNK_SIZE, HASH_SIZE};
use crate::core::errors::VerityHashError;
use crate::core::verity::SALT_SIZE;

/// Parameters binding a data region to a Merkle tree root.
///
/// The tree uses 4 KiB blocks at both data and hash level, SHA-256
/// everywhere, salt prepended per hashed block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VerityParams {
    data_size: u64,
    root_digest: ChunkHash,
    salt: [u8; SALT_SIZE],
}

impl VerityParams {
    /// Creates verity parameters.
    ///
    /// Fails with [`VerityHashError::Size`] when `data_size` is not a
    /// multiple of 4096.
    pub fn new(
        data_size: u64,
        root_digest: ChunkHash,
        salt: [u8; SALT_SIZE],
    ) -> Result<VerityParams, VerityHashError> {
        if data_size == 0 || data_size % CHUNK_SIZE as u64 != 0 {
            let err_msg = format!(
                "verity data size {} is not a positive multiple of {}",
                data_size, CHUNK_SIZE
            );

            return Err(VerityHashError::Size(err_msg));
        }

        let params = VerityParams {
            data_size,
            root_digest,
            salt,
        };

        Ok(params)
    }

    /// Creates verity parameters from the manifest's lowercase hex encoding.
    pub fn from_hex(
        data_size: u64,
        root_digest_hex: &str,
        salt_hex: &str,
    ) -> Result<VerityParams, VerityHashError> {
        let root = hex::decode(root_digest_hex).map_err(|e| {
            VerityHashError::Digest(format!("invalid root digest {:?}: {}", root_digest_hex, e))
        })?;
        let root_digest: ChunkHash = root.try_into().map_err(|_| {
            VerityHashError::Digest(format!(
                "root digest {:?} is not {} bytes",
                root_digest_hex, HASH_SIZE
            ))
        })?;

        let salt_bytes = hex::decode(salt_hex)
            .map_err(|e| VerityHashError::Salt(format!("invalid salt {:?}: {}", salt_hex, e)))?;
        let salt: [u8; SALT_SIZE] = salt_bytes.try_into().map_err(|_| {
            VerityHashError::Salt(format!("salt {:?} is not {} bytes", salt_hex, SALT_SIZE))
        })?;

        Self::new(data_size, root_digest, salt)
    }

    /// Returns the size of the authenticated data region, in bytes.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Returns the size of the authenticated data region, in 4 KiB blocks.
    pub fn data_blocks(&self) -> u64 {
        self.data_size / CHUNK_SIZE as u64
    }

    /// Returns the root digest.
    pub fn root_digest(&self) -> &ChunkHash {
        &self.root_digest
    }

    /// Returns the root digest as lowercase hex.
    pub fn root_digest_hex(&self) -> String {
        hex::encode(self.root_digest)
    }

    /// Returns the salt.
    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }

    /// Returns the salt as lowercase hex.
    pub fn salt_hex(&self) -> String {
        hex::encode(self.salt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verity_params_rejects_an_unaligned_data_size() {
        let actual = VerityParams::new(4097, [0u8; 32], [0u8; 32]);
        assert!(matches!(actual, Err(VerityHashError::Size(_))));

        let actual = VerityParams::new(0, [0u8; 32], [0u8; 32]);
        assert!(matches!(actual, Err(VerityHashError::Size(_))));
    }

    #[test]
    fn verity_params_round_trips_hex_encodings() -> crate::Result<()> {
        let root_hex = "3049cbffaa49c6dc12e9cd1dd4604ef5a290e3d13b379c5a50d356e68423de23";
        let salt_hex = "799ea94008bbdc6555d7895d1b647e2abfd213171f0e8b670e1da951406f4691";

        let params = VerityParams::from_hex(4096 * 129, root_hex, salt_hex)?;

        assert_eq!(params.data_blocks(), 129);
        assert_eq!(params.root_digest_hex(), root_hex);
        assert_eq!(params.salt_hex(), salt_hex);

        Ok(())
    }

    #[test]
    fn verity_params_rejects_a_short_salt() {
        let root_hex = "3049cbffaa49c6dc12e9cd1dd4604ef5a290e3d13b379c5a50d356e68423de23";

        let actual = VerityParams::from_hex(4096, root_hex, "799ea940");
        assert!(matches!(actual, Err(VerityHashError::Salt(_))));
    }
}
