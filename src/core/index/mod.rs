// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content-addressed chunk lookup.

// From dependency library

// From standard library

// From this library
pub use hash_index_struct::HashIndex;
pub use hash_region_enum::HashRegion;

mod hash_index_struct;
mod hash_region_enum;
