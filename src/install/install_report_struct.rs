// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library

// From this library

/// Outcome of a whole-manifest install.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    /// One report per installed image, in manifest order.
    pub images: Vec<ImageReport>,
}

/// Outcome of one image stream.
#[derive(Debug, Clone)]
pub struct ImageReport {
    /// Destination slot name.
    pub slot: String,
    /// Total chunks streamed.
    pub blocks: u32,
    /// Chunks reused from local disk.
    pub reused: u64,
    /// Chunks fetched through the verity device.
    pub fetched: u64,
    /// Zero chunks satisfied by a discard.
    pub zeroed: u64,
}
