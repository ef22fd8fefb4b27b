// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loop devices.

// From dependency library

// From standard library

// From this library
pub use loop_device_struct::LoopDevice;

mod loop_device_struct;
