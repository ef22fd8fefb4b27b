// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`Manifest`](crate::install::Manifest) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// Error if the manifest targets a different system.
    #[error("{0}")]
    Incompatible(String),

    /// Error if a manifest record contradicts itself.
    #[error("{0}")]
    Invalid(String),
}
