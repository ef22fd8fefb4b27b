// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Library-level error module.

// From dependency library
use thiserror::Error;

// From standard library

// From this library
use crate::boot::BootChooserError;
use crate::config::ConfigError;

use crate::core::errors::HashIndexError;
use crate::core::errors::LoopDeviceError;
use crate::core::errors::NbdDeviceError;
use crate::core::errors::NbdServerError;
use crate::core::errors::SlotError;
use crate::core::errors::VerityHashError;
use crate::core::errors::VerityTargetError;

use crate::install::InstallerError;
use crate::install::ManifestError;

/// A specialized [`Result`](std::result::Result) type for `rsupdate`.
///
/// This typedef is generally used at the program-level to avoid writing out
/// [`RsUpdateError`] directly, and is, otherwise, a direct mapping to
/// [`Result`](std::result::Result).
#[allow(dead_code)]
pub type Result<T> = std::result::Result<T, RsUpdateError>;

/// Library-level runtime errors.
///
/// This enum includes all variants of error types susceptible to occur in
/// the library. Other, more granular error types, are automatically
/// converted to `RsUpdateError` when needed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RsUpdateError {
    #[error(transparent)]
    BootChooser(#[from] BootChooserError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    HashIndex(#[from] HashIndexError),

    #[error(transparent)]
    Installer(#[from] InstallerError),

    #[error(transparent)]
    LoopDevice(#[from] LoopDeviceError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    NbdDevice(#[from] NbdDeviceError),

    #[error(transparent)]
    NbdServer(#[from] NbdServerError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    VerityHash(#[from] VerityHashError),

    #[error(transparent)]
    VerityTarget(#[from] VerityTargetError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
