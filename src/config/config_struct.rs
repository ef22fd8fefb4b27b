// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use typed_builder::TypedBuilder;

// From standard library
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// From this library
use crate::boot::Bootloader;
use crate::config::{ConfigError, PollConfig};
use crate::core::slot::Slot;

/// System configuration: compatible string, bootloader, slot catalog,
/// optional poll collaborator.
///
/// The configuration is a plain nested record; parsing whatever file format
/// carries it on a given system is the caller's concern. Slot `parent`
/// links hold slot *names* and are checked against the catalog by
/// [`validate`](Self::validate); they are never owning references.
///
/// ```
/// use rsupdate::boot::Bootloader;
/// use rsupdate::config::Config;
/// use rsupdate::core::slot::Slot;
///
/// fn main() -> rsupdate::Result<()> {
///     let config = Config::builder()
///         .compatible("vendor-board-v1")
///         .bootloader(Bootloader::Noop)
///         .slot(
///             Slot::builder()
///                 .name("rootfs.0")
///                 .class("rootfs")
///                 .device("/dev/mmcblk0p2")
///                 .bootname("A")
///                 .build(),
///         )
///         .slot(
///             Slot::builder()
///                 .name("rootfs.1")
///                 .class("rootfs")
///                 .device("/dev/mmcblk0p3")
///                 .bootname("B")
///                 .build(),
///         )
///         .build();
///
///     config.validate()?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(mutators(
    /// Adds a slot to the catalog, keyed by its name.
    pub fn slot(&mut self, slot: Slot) {
        self.slots.insert(slot.name().to_owned(), slot);
    }
))]
pub struct Config {
    /// Identifier a bundle's manifest must match. Required.
    #[builder(setter(into))]
    compatible: String,

    /// Bootloader behind the slot-state interface.
    #[builder(default = Bootloader::Noop)]
    bootloader: Bootloader,

    /// Where slots get mounted when a handler needs them.
    #[builder(default = PathBuf::from("/mnt/rauc/"), setter(into))]
    mount_prefix: PathBuf,

    /// Trust root for manifest signatures.
    #[builder(default, setter(into, strip_option))]
    keyring_path: Option<PathBuf>,

    /// Slot catalog, keyed by slot name.
    #[builder(via_mutators)]
    slots: HashMap<String, Slot>,

    /// Poll collaborator configuration.
    #[builder(default, setter(strip_option))]
    poll: Option<PollConfig>,
}

impl Config {
    /// Returns the compatible identifier.
    pub fn compatible(&self) -> &str {
        &self.compatible
    }

    /// Returns the configured bootloader.
    pub fn bootloader(&self) -> Bootloader {
        self.bootloader
    }

    /// Returns the mount prefix.
    pub fn mount_prefix(&self) -> &Path {
        &self.mount_prefix
    }

    /// Returns the keyring path, if any.
    pub fn keyring_path(&self) -> Option<&Path> {
        self.keyring_path.as_deref()
    }

    /// Returns the slot catalog.
    pub fn slots(&self) -> &HashMap<String, Slot> {
        &self.slots
    }

    /// Returns the slot named `name`, if configured.
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    /// Resolves a slot's parent in the catalog.
    pub fn parent_of(&self, slot: &Slot) -> Option<&Slot> {
        slot.parent().and_then(|name| self.slots.get(name))
    }

    /// Returns the poll configuration, if any.
    pub fn poll(&self) -> Option<&PollConfig> {
        self.poll.as_ref()
    }

    /// Checks the configuration for consistency: a non-empty compatible, a
    /// resolvable parent for every slot that names one, a sane poll section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compatible.is_empty() {
            return Err(ConfigError::Missing(
                "system.compatible must be set".to_owned(),
            ));
        }

        for slot in self.slots.values() {
            let Some(parent) = slot.parent() else {
                continue;
            };

            if parent == slot.name() {
                return Err(ConfigError::Invalid(format!(
                    "slot {:?} is its own parent",
                    slot.name()
                )));
            }
            if !self.slots.contains_key(parent) {
                return Err(ConfigError::Invalid(format!(
                    "slot {:?} references unknown parent {:?}",
                    slot.name(),
                    parent
                )));
            }
        }

        if let Some(poll) = &self.poll {
            poll.validate()?;
        }

        Ok(())
    }
}
