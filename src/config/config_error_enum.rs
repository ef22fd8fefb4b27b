// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use thiserror::Error;

// From standard library

// From this library

/// [`Config`](crate::config::Config) validation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Error if a required option is absent.
    #[error("{0}")]
    Missing(String),

    /// Error if an option holds an invalid value.
    #[error("{0}")]
    Invalid(String),
}
