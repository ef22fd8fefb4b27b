// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A/B slot records.

// From dependency library

// From standard library

// From this library
pub use access_mode_enum::AccessMode;
pub use slot_struct::Slot;

mod access_mode_enum;
mod slot_struct;
