// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library
use crate::core::chunk::ChunkHash;

/// Result of building a Merkle tree over a data region.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VerityHash {
    /// Data blocks plus the block counts of every hash level.
    pub combined_blocks: u64,
    /// Apex hash of the tree. The only value that must be authenticated out
    /// of band.
    pub root_digest: ChunkHash,
}
