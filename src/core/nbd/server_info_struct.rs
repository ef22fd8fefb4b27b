// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use serde::{Deserialize, Serialize};

// From standard library

// From this library

/// State discovered about the remote bundle during server startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerInfo {
    /// Bundle size, in bytes.
    pub data_size: u64,
    /// URL after redirects; range requests go here.
    pub effective_url: String,
    /// Server-reported `Date` header, verbatim.
    pub current_time: Option<String>,
    /// Server-reported `Last-Modified` header, verbatim.
    pub modified_time: Option<String>,
    /// Server-reported `ETag`, for conditional polling.
    pub etag: Option<String>,
}
