// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library
use crate::boot::{BootBackend, BootChooserError, BootState, Bootloader, NoopBackend};
use crate::core::slot::Slot;

/// Dispatcher in front of a bootloader backend.
///
/// Concrete backends (barebox, grub, uboot, efi, custom) live with their
/// environment tooling and are injected through
/// [`with_backend`](Self::with_backend); a [`NoopBackend`] ships for tests.
/// Every backend error comes back prefixed with the backend name.
#[derive(Debug)]
pub struct BootChooser {
    bootloader: Bootloader,
    backend: Box<dyn BootBackend>,
}

impl BootChooser {
    /// Creates a chooser over the in-memory noop backend.
    pub fn noop() -> BootChooser {
        BootChooser {
            bootloader: Bootloader::Noop,
            backend: Box::new(NoopBackend::new()),
        }
    }

    /// Creates a chooser over an injected backend.
    pub fn with_backend(bootloader: Bootloader, backend: Box<dyn BootBackend>) -> BootChooser {
        BootChooser {
            bootloader,
            backend,
        }
    }

    /// Returns the bootloader type behind this chooser.
    pub fn bootloader(&self) -> Bootloader {
        self.bootloader
    }

    /// Queries a slot's boot-selection state.
    pub fn get_state(&self, slot: &Slot) -> Result<BootState, BootChooserError> {
        log::debug!("BootChooser::get_state querying slot {:?}", slot.name());

        self.backend
            .get_state(slot)
            .map_err(|e| self.backend_error(e))
    }

    /// Marks a slot good or bad.
    pub fn set_state(&self, slot: &Slot, good: bool) -> Result<(), BootChooserError> {
        log::debug!(
            "BootChooser::set_state marking slot {:?} {}",
            slot.name(),
            if good { "good" } else { "bad" }
        );

        self.backend
            .set_state(slot, good)
            .map_err(|e| self.backend_error(e))
    }

    /// Returns the bootname the bootloader will try first on next boot.
    pub fn get_primary(&self) -> Result<String, BootChooserError> {
        log::debug!("BootChooser::get_primary querying primary slot");

        self.backend.get_primary().map_err(|e| self.backend_error(e))
    }

    /// Makes a slot the one tried first on next boot.
    pub fn set_primary(&self, slot: &Slot) -> Result<(), BootChooserError> {
        log::debug!(
            "BootChooser::set_primary making slot {:?} primary",
            slot.name()
        );

        self.backend
            .set_primary(slot)
            .map_err(|e| self.backend_error(e))
    }

    fn backend_error(
        &self,
        err: Box<dyn std::error::Error + Send + Sync>,
    ) -> BootChooserError {
        let err_msg = format!("{} backend: {}", self.bootloader, err);
        log::debug!("BootChooser {}", err_msg);

        BootChooserError::Backend(err_msg)
    }
}
