// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Device-mapper verity targets.

// From dependency library

// From standard library

// From this library
pub use verity_target_struct::VerityTarget;

mod verity_target_struct;
