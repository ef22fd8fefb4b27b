// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`NbdDevice`](crate::core::nbd::NbdDevice) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NbdDeviceError {
    /// Error while configuring an NBD device in the kernel.
    #[error("{0}")]
    Startup(String),

    /// Error while disconnecting an NBD device.
    #[error("{0}")]
    Disconnect(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
