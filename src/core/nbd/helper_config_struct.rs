// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use serde::{Deserialize, Serialize};

// From standard library

// From this library

/// Configuration handed to the NBD helper process over the control socket,
/// one JSON line, before any NBD framing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HelperConfig {
    /// Bundle URL.
    pub url: String,
    /// TLS client certificate: a local file path or a PKCS#11 URI.
    pub tls_cert: Option<String>,
    /// TLS client key: a local file path or a PKCS#11 URI.
    pub tls_key: Option<String>,
    /// CA bundle file path.
    pub tls_ca: Option<String>,
    /// Disables peer verification. Testing only.
    pub no_verify: bool,
    /// Extra request headers, `Name: value` each.
    pub headers: Vec<String>,
    /// Known bundle ETag; sent as `If-None-Match` so an unchanged bundle
    /// short-circuits.
    pub etag: Option<String>,
}
