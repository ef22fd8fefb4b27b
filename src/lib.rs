// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # Table of Contents
//! 1. [Description](#description)
//! 2. [API structure](#api-structure)
//! 3. [Examples](#examples)
//!
//! ## Description
//!
//! The `rsupdate` library is a streaming A/B firmware update engine for
//! embedded Linux devices.
//!
//! `rsupdate` allows users to, among other things:
//! - expose a remote HTTP(S)-hosted update bundle to the kernel as a local
//!   block device, backed by range requests,
//! - authenticate every 4 KiB read from that device against a single signed
//!   root digest, through a dm-verity target,
//! - reuse 4 KiB chunks already present on local storage instead of
//!   fetching them, via a content-addressed hash index,
//! - stream an update bundle onto an inactive slot and hand it over to the
//!   bootloader,
//! - schedule update polls with jitter and error backoff.
//!
//! ## API structure
//!
//! `rsupdate`'s API is roughly divided into five main modules:
//! - `core`: a module for items in the library's low-level API: chunks and
//!   their hash index, the verity hash tree, device-mapper targets, NBD
//!   servers, loop devices, slot records.
//! - `install`: a module for the streaming installer composing the `core`
//!   pieces into a slot update.
//! - `config`: a module for the system configuration records.
//! - `boot`: a module for the bootloader slot-state interface.
//! - `poll`: a module for poll scheduling and update criteria.
//!
//! Finally, look to the `debug` module if you need to consult debug
//! messages during development.
//!
//! ## Examples
//!
//! Stream an update bundle into the inactive slot:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rsupdate::boot::BootChooser;
//! use rsupdate::config::Config;
//! use rsupdate::core::slot::Slot;
//! use rsupdate::core::verity::VerityParams;
//! use rsupdate::install::{ImageSpec, InstallContext, Installer, Manifest};
//!
//! fn main() -> rsupdate::Result<()> {
//!     let config = Config::builder()
//!         .compatible("vendor-board-v1")
//!         .slot(
//!             Slot::builder()
//!                 .name("rootfs.1")
//!                 .class("rootfs")
//!                 .device("/dev/mmcblk0p3")
//!                 .bootname("B")
//!                 .build(),
//!         )
//!         .build();
//!     config.validate()?;
//!
//!     let manifest = Manifest::builder()
//!         .compatible("vendor-board-v1")
//!         .version("2024.03.1")
//!         .images(vec![ImageSpec::builder()
//!             .checksum([0u8; 32]) // from the signed manifest
//!             .size_blocks(65536)
//!             .verity(VerityParams::from_hex(
//!                 65536 * 4096,
//!                 "3049cbffaa49c6dc12e9cd1dd4604ef5a290e3d13b379c5a50d356e68423de23",
//!                 "799ea94008bbdc6555d7895d1b647e2abfd213171f0e8b670e1da951406f4691",
//!             )?)
//!             .target_slot("rootfs.1")
//!             .build()])
//!         .build();
//!
//!     let context = InstallContext::new(Arc::new(config), BootChooser::noop());
//!     let mut installer = Installer::new(context);
//!     installer.install(&manifest, "https://updates.example.com/update.bundle")?;
//!
//!     Ok(())
//! }
//! ```

pub mod boot;
pub mod config;
pub mod core;
pub mod debug;
pub mod install;
pub mod poll;

pub(crate) mod sys_utils;

mod prelude {}

#[allow(unused_imports)]
use prelude::*;

pub use error::*;

mod error;
