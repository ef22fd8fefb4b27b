// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bootloader slot-state interface.

// From dependency library

// From standard library

// From this library
pub use boot_chooser_error_enum::BootChooserError;
pub use boot_chooser_struct::BootChooser;
pub use boot_state_struct::BootState;
pub use bootloader_enum::Bootloader;
pub use noop_backend_struct::NoopBackend;

mod boot_chooser_error_enum;
mod boot_chooser_struct;
mod boot_state_struct;
mod bootloader_enum;
mod noop_backend_struct;

use crate::core::slot::Slot;

/// Result type backends report with. Errors cross the interface unchanged;
/// [`BootChooser`] prefixes them with the backend name.
pub type BackendResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// The four operations a bootloader backend provides.
pub trait BootBackend: std::fmt::Debug + Send {
    /// Queries a slot's boot-selection state.
    fn get_state(&self, slot: &Slot) -> BackendResult<BootState>;

    /// Marks a slot good or bad.
    fn set_state(&self, slot: &Slot, good: bool) -> BackendResult<()>;

    /// Returns the bootname tried first on next boot.
    fn get_primary(&self) -> BackendResult<String>;

    /// Makes a slot the one tried first on next boot.
    fn set_primary(&self, slot: &Slot) -> BackendResult<()>;
}
