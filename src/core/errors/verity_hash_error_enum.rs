// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`verity`](crate::core::verity) hash tree runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerityHashError {
    /// Error if a salt has the wrong length or is not valid hex.
    #[error("{0}")]
    Salt(String),

    /// Error if a root digest has the wrong length or is not valid hex.
    #[error("{0}")]
    Digest(String),

    /// Error if a data region's length contradicts its declared structure.
    #[error("{0}")]
    Size(String),

    /// Error if a computed hash disagrees with the stored hash tree.
    #[error("{0}")]
    Mismatch(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
