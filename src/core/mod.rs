// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Low-level API: the streaming update data plane.

// From dependency library

// From standard library

// From this library
pub mod chunk;
pub mod dm;
pub mod errors;
pub mod index;
pub mod loopdev;
pub mod nbd;
pub mod slot;
pub mod verity;
