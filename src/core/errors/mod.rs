// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime errors.

// From dependency library

// From standard library

// From this library
pub use hash_index_error_enum::HashIndexError;
pub use loop_device_error_enum::LoopDeviceError;
pub use nbd_device_error_enum::NbdDeviceError;
pub use nbd_server_error_enum::NbdServerError;
pub use slot_error_enum::SlotError;
pub use verity_hash_error_enum::VerityHashError;
pub use verity_target_error_enum::VerityTargetError;

mod hash_index_error_enum;
mod loop_device_error_enum;
mod nbd_device_error_enum;
mod nbd_server_error_enum;
mod slot_error_enum;
mod verity_hash_error_enum;
mod verity_target_error_enum;
