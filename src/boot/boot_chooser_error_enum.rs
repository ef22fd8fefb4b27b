// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`BootChooser`](crate::boot::BootChooser) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BootChooserError {
    /// Error if the configured bootloader type has no backend.
    #[error("{0}")]
    NotSupported(String),

    /// Error reported by a backend, prefixed with the backend name.
    #[error("{0}")]
    Backend(String),
}
