// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`Slot`](crate::core::slot::Slot) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SlotError {
    /// Error while opening a slot's block device.
    #[error("{0}")]
    Open(String),

    /// Error while discarding a region of a slot.
    #[error("{0}")]
    Discard(String),

    /// Error if a slot is too small for the content it should hold.
    #[error("{0}")]
    Size(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
