// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use num_enum::{IntoPrimitive, TryFromPrimitive};

// From standard library

// From this library
use crate::core::errors::NbdServerError;
use crate::install::{InstallerError, ManifestError};

/// Process exit codes of the update agent. No other codes are defined.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(i32)]
#[non_exhaustive]
pub enum ExitCode {
    Success = 0,
    /// The install failed after checks passed.
    InstallFailure = 1,
    /// Invalid configuration or missing required option.
    ConfigurationError = 2,
    /// The bundle failed a check: signature, size, or verity.
    BundleCheckFailure = 3,
    /// Cooperative cancellation.
    Cancelled = 10,
}

impl From<&InstallerError> for ExitCode {
    fn from(err: &InstallerError) -> ExitCode {
        match err {
            InstallerError::Cancelled(_) => ExitCode::Cancelled,
            InstallerError::Config(_) => ExitCode::ConfigurationError,
            InstallerError::NbdServer(NbdServerError::Configuration(_)) => {
                ExitCode::ConfigurationError
            }
            InstallerError::BundleCheck(_)
            | InstallerError::Manifest(ManifestError::Incompatible(_))
            | InstallerError::Manifest(ManifestError::Invalid(_))
            | InstallerError::VerityHash(_) => ExitCode::BundleCheckFailure,
            _ => ExitCode::InstallFailure,
        }
    }
}
