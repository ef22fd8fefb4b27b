// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use serde::{Deserialize, Serialize};

// From standard library

// From this library
use crate::core::nbd::ServerInfo;

/// Discovery outcome reported by the NBD helper over the control socket,
/// one JSON line, in response to a [`HelperConfig`](crate::core::nbd::HelperConfig).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum HelperReport {
    /// Discovery succeeded; the helper is serving NBD requests.
    Ready { info: ServerInfo },
    /// The conditional request short-circuited: the bundle is unchanged.
    NotModified,
    /// Discovery failed.
    Error {
        kind: HelperErrorKind,
        message: String,
    },
}

/// Error class carried by a failed discovery report.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HelperErrorKind {
    NotFound,
    Unauthorized,
    Configuration,
    Timeout,
    Protocol,
}
