// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`LoopDevice`](crate::core::loopdev::LoopDevice) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoopDeviceError {
    /// Error while attaching a backing file to a loop device.
    #[error("{0}")]
    Attach(String),

    /// Error while detaching a loop device.
    #[error("{0}")]
    Detach(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
