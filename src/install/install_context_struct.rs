// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// From this library
use crate::boot::BootChooser;
use crate::config::Config;

/// Everything an orchestration call needs, passed explicitly.
///
/// The cancel flag is shared: clone a handle with
/// [`cancel_handle`](Self::cancel_handle), hand it to whatever supervises
/// the install, and set it to stop the stream at the next suspension point.
#[derive(Debug)]
pub struct InstallContext {
    config: Arc<Config>,
    boot: BootChooser,
    cancel: Arc<AtomicBool>,
    verify_after_write: bool,
}

impl InstallContext {
    /// Creates a context over a validated configuration and a boot chooser.
    pub fn new(config: Arc<Config>, boot: BootChooser) -> InstallContext {
        InstallContext {
            config,
            boot,
            cancel: Arc::new(AtomicBool::new(false)),
            verify_after_write: false,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the boot chooser.
    pub fn boot(&self) -> &BootChooser {
        &self.boot
    }

    /// Re-reads and re-hashes every written slot after the stream.
    pub fn set_verify_after_write(&mut self, verify: bool) {
        self.verify_after_write = verify;
    }

    /// Returns whether written slots are re-verified.
    pub fn verify_after_write(&self) -> bool {
        self.verify_after_write
    }

    /// Returns a shared handle on the cancel flag.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
