// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`VerityTarget`](crate::core::dm::VerityTarget) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VerityTargetError {
    /// Error while registering a dm-verity target in the kernel.
    #[error("{0}")]
    Setup(String),

    /// Error while removing a dm-verity target from the kernel.
    #[error("{0}")]
    Remove(String),

    /// Error if a dm-verity target is still open after the remove retries are exhausted.
    #[error("{0}")]
    Busy(String),

    /// Error if the initial read from the authenticated device fails.
    #[error("{0}")]
    CheckRead(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
