// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Merkle hash tree over 4 KiB blocks.
//!
//! [`create_hash`] builds the tree a dm-verity target enforces online;
//! [`verify_hash`] recomputes it offline against an already-appended tree.

// From dependency library
use sha2::{Digest, Sha256};

// From standard library
use std::fs::File;
use std::os::unix::fs::FileExt;

// From this library
pub use verity_hash_struct::VerityHash;
pub use verity_params_struct::VerityParams;

use crate::core::chunk::{ChunkHash, CHUNK_SIZE, HASH_SIZE};
use crate::core::errors::VerityHashError;

mod verity_hash_struct;
mod verity_params_struct;

/// Salt length, in bytes. Shorter salts are an error.
pub const SALT_SIZE: usize = 32;

/// Hashes packed into one 4 KiB hash block.
const DIGESTS_PER_BLOCK: u64 = (CHUNK_SIZE / HASH_SIZE) as u64;

/// Builds the hash tree of `data_blocks` 4 KiB blocks of `data`, appending
/// each level immediately after the region it covers.
///
/// Levels are laid out the way the kernel expects them: the level closest to
/// the root first, level 0 last. Returns the combined size (data blocks plus
/// every tree level) and the root digest.
pub fn create_hash(
    data: &File,
    data_blocks: u64,
    salt: &[u8],
) -> Result<VerityHash, VerityHashError> {
    log::debug!("verity::create_hash building tree over {} blocks", data_blocks);

    let salt = check_salt(salt)?;
    let layout = TreeLayout::new(data_blocks)?;

    for level in 0..layout.levels() {
        let (src_start, src_blocks) = layout.source_region(level);
        process_level(
            data,
            src_start,
            src_blocks,
            layout.level_start(level),
            salt,
            Mode::Create,
        )?;
    }

    let root_digest = root_digest(data, &layout, salt)?;
    data.sync_all()?;

    log::debug!(
        "verity::create_hash combined size {} blocks, root {}",
        layout.combined_blocks(),
        hex::encode(root_digest)
    );

    Ok(VerityHash {
        combined_blocks: layout.combined_blocks(),
        root_digest,
    })
}

/// Verifies the hash tree previously appended to `data` against
/// `root_digest`.
///
/// Every stored byte is compared against a recomputation; fails fast with
/// [`VerityHashError::Mismatch`] on the first disagreement. Never writes.
pub fn verify_hash(
    data: &File,
    data_blocks: u64,
    salt: &[u8],
    root_digest: &ChunkHash,
) -> Result<(), VerityHashError> {
    log::debug!("verity::verify_hash checking tree over {} blocks", data_blocks);

    let salt = check_salt(salt)?;
    let layout = TreeLayout::new(data_blocks)?;

    for level in 0..layout.levels() {
        let (src_start, src_blocks) = layout.source_region(level);
        process_level(
            data,
            src_start,
            src_blocks,
            layout.level_start(level),
            salt,
            Mode::Verify,
        )?;
    }

    let computed = self::root_digest(data, &layout, salt)?;
    if computed != *root_digest {
        let err_msg = format!(
            "root digest mismatch: computed {}, expected {}",
            hex::encode(computed),
            hex::encode(root_digest)
        );
        log::debug!("verity::verify_hash {}", err_msg);

        return Err(VerityHashError::Mismatch(err_msg));
    }

    Ok(())
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum Mode {
    Create,
    Verify,
}

/// Block offsets of every hash level above the data region.
struct TreeLayout {
    data_blocks: u64,
    /// `level_starts[i]` is the block offset of level `i`. Higher levels sit
    /// at lower offsets.
    level_starts: Vec<u64>,
    combined_blocks: u64,
}

impl TreeLayout {
    fn new(data_blocks: u64) -> Result<TreeLayout, VerityHashError> {
        if data_blocks == 0 {
            return Err(VerityHashError::Size(
                "verity tree needs at least one data block".to_owned(),
            ));
        }

        let levels = tree_levels(data_blocks);
        let mut level_starts = vec![0u64; levels as usize];
        let mut next = data_blocks;

        for level in (0..levels).rev() {
            level_starts[level as usize] = next;
            next += level_blocks(data_blocks, level);
        }

        Ok(TreeLayout {
            data_blocks,
            level_starts,
            combined_blocks: next,
        })
    }

    fn levels(&self) -> u32 {
        self.level_starts.len() as u32
    }

    fn level_start(&self, level: u32) -> u64 {
        self.level_starts[level as usize]
    }

    fn combined_blocks(&self) -> u64 {
        self.combined_blocks
    }

    /// Region hashed into `level`: the data region for level 0, the previous
    /// level otherwise.
    fn source_region(&self, level: u32) -> (u64, u64) {
        if level == 0 {
            (0, self.data_blocks)
        } else {
            (
                self.level_start(level - 1),
                level_blocks(self.data_blocks, level - 1),
            )
        }
    }

    /// Region whose single block hashes to the root: the top level, or the
    /// data region itself when the tree has no stored level. Levels are
    /// indexed bottom-up, so the top level is the last entry.
    fn root_region(&self) -> u64 {
        match self.level_starts.last() {
            Some(&start) => start,
            None => 0,
        }
    }
}

/// Number of stored hash levels. A single data block needs none: its salted
/// hash is the root.
fn tree_levels(data_blocks: u64) -> u32 {
    let mut levels = 0u32;
    while 7 * levels < 64 && (data_blocks - 1) >> (7 * levels) != 0 {
        levels += 1;
    }

    levels
}

/// Block count of hash level `level`.
fn level_blocks(data_blocks: u64, level: u32) -> u64 {
    let mut blocks = data_blocks;
    for _ in 0..=level {
        blocks = (blocks + DIGESTS_PER_BLOCK - 1) / DIGESTS_PER_BLOCK;
    }

    blocks
}

fn check_salt(salt: &[u8]) -> Result<&[u8], VerityHashError> {
    if salt.len() != SALT_SIZE {
        let err_msg = format!("salt is {} bytes, expected {}", salt.len(), SALT_SIZE);

        return Err(VerityHashError::Salt(err_msg));
    }

    Ok(salt)
}

fn block_digest(salt: &[u8], block: &[u8]) -> ChunkHash {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(block);

    hasher.finalize().into()
}

/// Hashes `src_blocks` blocks starting at block `src_start`, packing the
/// digests into 4 KiB blocks at `dst_start` (zero-padded tail). `Create`
/// writes the packed blocks; `Verify` compares them against what is stored.
fn process_level(
    data: &File,
    src_start: u64,
    src_blocks: u64,
    dst_start: u64,
    salt: &[u8],
    mode: Mode,
) -> Result<(), VerityHashError> {
    let mut src = [0u8; CHUNK_SIZE];
    let mut packed = [0u8; CHUNK_SIZE];
    let mut stored = [0u8; CHUNK_SIZE];
    let mut filled = 0usize;
    let mut dst_block = dst_start;

    for n in 0..src_blocks {
        data.read_exact_at(&mut src, (src_start + n) * CHUNK_SIZE as u64)?;

        let digest = block_digest(salt, &src);
        packed[filled..filled + HASH_SIZE].copy_from_slice(&digest);
        filled += HASH_SIZE;

        if filled == CHUNK_SIZE || n + 1 == src_blocks {
            packed[filled..].fill(0);

            match mode {
                Mode::Create => {
                    data.write_all_at(&packed, dst_block * CHUNK_SIZE as u64)?;
                }
                Mode::Verify => {
                    data.read_exact_at(&mut stored, dst_block * CHUNK_SIZE as u64)?;
                    if stored != packed {
                        let err_msg = format!(
                            "hash tree mismatch in block {} covering block {}",
                            dst_block,
                            src_start + n
                        );
                        log::debug!("verity::verify_hash {}", err_msg);

                        return Err(VerityHashError::Mismatch(err_msg));
                    }
                }
            }

            filled = 0;
            dst_block += 1;
        }
    }

    Ok(())
}

fn root_digest(
    data: &File,
    layout: &TreeLayout,
    salt: &[u8],
) -> Result<ChunkHash, VerityHashError> {
    let mut block = [0u8; CHUNK_SIZE];
    data.read_exact_at(&mut block, layout.root_region() * CHUNK_SIZE as u64)?;

    Ok(block_digest(salt, &block))
}
