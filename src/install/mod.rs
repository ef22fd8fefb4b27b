// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The streaming installer.

// From dependency library

// From standard library

// From this library
pub use exit_code_enum::ExitCode;
pub use install_context_struct::InstallContext;
pub use install_report_struct::{ImageReport, InstallReport};
pub use installer_error_enum::InstallerError;
pub use installer_struct::Installer;
pub use manifest_error_enum::ManifestError;
pub use manifest_struct::{ImageSpec, Manifest};

mod exit_code_enum;
mod install_context_struct;
mod install_report_struct;
mod installer_error_enum;
mod installer_struct;
mod manifest_error_enum;
mod manifest_struct;
