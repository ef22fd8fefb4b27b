// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// Boot-selection state of a slot, as the bootloader sees it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BootState {
    /// The bootloader considers the slot bootable. A cleared flag marks the
    /// slot bad.
    pub good: bool,
    /// The slot is the one currently booted.
    pub active: bool,
}
