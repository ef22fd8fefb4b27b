// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use sha2::{Digest, Sha256};

// From standard library
use std::fmt;

// From this library

/// Size of a chunk, in bytes. The universal unit of addressing and deduplication.
pub const CHUNK_SIZE: usize = 4096;

/// Size of a chunk's SHA-256 hash, in bytes.
pub const HASH_SIZE: usize = 32;

/// A chunk's SHA-256 hash.
pub type ChunkHash = [u8; HASH_SIZE];

/// SHA-256 of a 4096-byte zero page.
pub const ZERO_CHUNK_HASH: ChunkHash = [
    0xad, 0x7f, 0xac, 0xb2, 0x58, 0x6f, 0xc6, 0xe9, 0x66, 0xc0, 0x04, 0xd7, 0xd1, 0xd1, 0x6b,
    0x02, 0x4f, 0x58, 0x05, 0xff, 0x7c, 0xb4, 0x7c, 0x7a, 0x85, 0xda, 0xbd, 0x8b, 0x48, 0x89,
    0x2c, 0xa7,
];

/// A 4096-byte chunk payload.
///
/// The buffer is 4096-byte aligned so it can back `O_DIRECT` reads and writes on
/// slot block devices.
#[derive(Clone)]
#[repr(align(4096))]
pub struct ChunkData(pub [u8; CHUNK_SIZE]);

impl ChunkData {
    /// Creates a zero-filled buffer.
    pub fn new() -> ChunkData {
        ChunkData([0u8; CHUNK_SIZE])
    }
}

impl Default for ChunkData {
    fn default() -> ChunkData {
        ChunkData::new()
    }
}

impl fmt::Debug for ChunkData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkData({} bytes)", CHUNK_SIZE)
    }
}

/// A chunk payload paired with its SHA-256 hash.
#[derive(Debug)]
pub struct Chunk {
    /// Chunk payload. Heap-held, `CHUNK_SIZE`-aligned.
    pub data: Box<ChunkData>,
    /// SHA-256 of `data`.
    pub hash: ChunkHash,
}

impl Chunk {
    /// Creates a zero-filled `Chunk` carrying the well-known zero-chunk hash.
    pub fn new() -> Chunk {
        Chunk {
            data: Box::new(ChunkData::new()),
            hash: ZERO_CHUNK_HASH,
        }
    }

    /// Recomputes the hash from the payload, stores it, and returns a copy.
    pub fn rehash(&mut self) -> ChunkHash {
        self.hash = hash_chunk(&self.data.0);
        self.hash
    }
}

impl Default for Chunk {
    fn default() -> Chunk {
        Chunk::new()
    }
}

/// Computes the SHA-256 hash of a chunk payload.
pub fn hash_chunk(data: &[u8]) -> ChunkHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
