// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use memmap2::Mmap;

// From standard library

// From this library

/// Backing storage of a hash index's hash-bytes region.
///
/// Immutable after open; shared read-only between indexes created with
/// [`HashIndex::reuse`](crate::core::index::HashIndex::reuse).
#[derive(Debug)]
pub enum HashRegion {
    /// Memory-mapped read-only view of a hash sidecar file.
    Mapped(Mmap),
    /// Heap-resident hashes, produced when a sidecar had to be rebuilt by
    /// streaming the data.
    Resident(Vec<u8>),
}

impl HashRegion {
    /// Returns the packed 32-byte hash records.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HashRegion::Mapped(map) => map,
            HashRegion::Resident(bytes) => bytes,
        }
    }
}
