// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`HashIndex`](crate::core::index::HashIndex) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HashIndexError {
    /// Error while creating a new [`HashIndex`](crate::core::index::HashIndex) instance.
    #[error("{0}")]
    Creation(String),

    /// Error while exporting a [`HashIndex`](crate::core::index::HashIndex) to disk.
    #[error("{0}")]
    Export(String),

    /// Error if a file or region's length contradicts its declared structure.
    #[error("{0}")]
    Size(String),

    /// Error if the requested chunk hash is absent from the index.
    #[error("{0}")]
    NotFound(String),

    /// Error if the indexed data changed under the index.
    #[error("{0}")]
    Modified(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
