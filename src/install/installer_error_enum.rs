// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library
use crate::boot::BootChooserError;
use crate::config::ConfigError;
use crate::core::errors::{
    HashIndexError, NbdServerError, SlotError, VerityHashError, VerityTargetError,
};
use crate::install::ManifestError;

/// [`Installer`](crate::install::Installer) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallerError {
    /// Error if the bundle failed a check beyond the manifest itself.
    #[error("{0}")]
    BundleCheck(String),

    /// Error if the written slot does not re-read as the source image.
    #[error("{0}")]
    Verify(String),

    /// The install was cancelled cooperatively.
    #[error("{0}")]
    Cancelled(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    HashIndex(#[from] HashIndexError),

    #[error(transparent)]
    VerityHash(#[from] VerityHashError),

    #[error(transparent)]
    VerityTarget(#[from] VerityTargetError),

    #[error(transparent)]
    NbdServer(#[from] NbdServerError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    BootChooser(#[from] BootChooserError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
