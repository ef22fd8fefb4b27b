// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! 4 KiB chunk primitives.

// From dependency library

// From standard library

// From this library
pub use chunk_struct::hash_chunk;
pub use chunk_struct::Chunk;
pub use chunk_struct::ChunkData;
pub use chunk_struct::ChunkHash;
pub use chunk_struct::CHUNK_SIZE;
pub use chunk_struct::HASH_SIZE;
pub use chunk_struct::ZERO_CHUNK_HASH;
pub use match_stats_struct::MatchStats;

mod chunk_struct;
mod match_stats_struct;
