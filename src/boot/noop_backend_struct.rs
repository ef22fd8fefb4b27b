// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::collections::HashMap;
use std::sync::Mutex;

// From this library
use crate::boot::{BackendResult, BootBackend, BootState};
use crate::core::slot::Slot;

/// In-memory bootloader backend for tests and bring-up.
///
/// Acknowledges every state change, remembers it, and treats unknown slots
/// as good.
#[derive(Debug, Default)]
pub struct NoopBackend {
    states: Mutex<HashMap<String, bool>>,
    primary: Mutex<Option<String>>,
}

impl NoopBackend {
    /// Creates a backend with no recorded state.
    pub fn new() -> NoopBackend {
        NoopBackend::default()
    }
}

impl BootBackend for NoopBackend {
    fn get_state(&self, slot: &Slot) -> BackendResult<BootState> {
        let good = self
            .states
            .lock()
            .unwrap()
            .get(slot.bootname())
            .copied()
            .unwrap_or(true);
        let active = self.primary.lock().unwrap().as_deref() == Some(slot.bootname());

        Ok(BootState { good, active })
    }

    fn set_state(&self, slot: &Slot, good: bool) -> BackendResult<()> {
        log::info!(
            "noop bootloader: ignore setting slot {} status to {}",
            slot.name(),
            if good { "good" } else { "bad" }
        );
        self.states
            .lock()
            .unwrap()
            .insert(slot.bootname().to_owned(), good);

        Ok(())
    }

    fn get_primary(&self) -> BackendResult<String> {
        self.primary
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| "no primary slot recorded".into())
    }

    fn set_primary(&self, slot: &Slot) -> BackendResult<()> {
        log::info!(
            "noop bootloader: ignore setting primary slot to {}",
            slot.name()
        );
        *self.primary.lock().unwrap() = Some(slot.bootname().to_owned());

        Ok(())
    }
}
