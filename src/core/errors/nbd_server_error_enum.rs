// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library
use crate::core::errors::NbdDeviceError;

/// [`NbdServer`](crate::core::nbd::NbdServer) runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NbdServerError {
    /// Error for an invalid URL, missing TLS material, or malformed headers.
    #[error("{0}")]
    Configuration(String),

    /// Error while setting up the helper subprocess or the kernel device.
    #[error("{0}")]
    Startup(String),

    /// Error if the remote served HTTP 401 or 403.
    #[error("{0}")]
    Unauthorized(String),

    /// Error if the remote served HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// The remote bundle is unchanged (HTTP 304 on a conditional request).
    #[error("{0}")]
    NotModified(String),

    /// Error for a violation of the NBD framing or the HTTP protocol.
    #[error("{0}")]
    Protocol(String),

    /// Error if a bounded wait was exceeded.
    #[error("{0}")]
    Timeout(String),

    #[error(transparent)]
    Device(#[from] NbdDeviceError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
