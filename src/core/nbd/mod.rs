// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bundle-over-network block devices.
//!
//! A remote HTTP(S)-hosted bundle is exposed to the kernel as a
//! random-access block device, so the verity and filesystem stack can read
//! it without downloading the whole file. The architecture is a two-process
//! split: the control side ([`NbdServer`]) owns the kernel device; a helper
//! subprocess ([`HelperSession`]) holds the HTTP/TLS state and serves range
//! requests.

// From dependency library

// From standard library

// From this library
pub use helper_config_struct::HelperConfig;
pub use helper_report_enum::{HelperErrorKind, HelperReport};
pub use helper_session_struct::{HelperSession, READAHEAD_WINDOW};
pub use nbd_command_enum::NbdCommand;
pub use nbd_device_struct::NbdDevice;
pub use nbd_server_struct::{NbdServer, HELPER_PROGRAM};
pub use reply_header_struct::{ReplyHeader, REPLY_HEADER_SIZE, REPLY_MAGIC};
pub use request_header_struct::{RequestHeader, REQUEST_HEADER_SIZE, REQUEST_MAGIC};
pub use server_info_struct::ServerInfo;

mod helper_config_struct;
mod helper_report_enum;
mod helper_session_struct;
mod nbd_command_enum;
mod nbd_device_struct;
mod nbd_server_struct;
mod reply_header_struct;
mod request_header_struct;
mod server_info_struct;
