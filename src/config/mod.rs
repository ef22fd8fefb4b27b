// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! System configuration records.

// From dependency library

// From standard library

// From this library
pub use candidate_criterion_enum::CandidateCriterion;
pub use config_error_enum::ConfigError;
pub use config_struct::Config;
pub use install_criterion_enum::InstallCriterion;
pub use poll_config_struct::PollConfig;
pub use reboot_criterion_enum::RebootCriterion;

mod candidate_criterion_enum;
mod config_error_enum;
mod config_struct;
mod install_criterion_enum;
mod poll_config_struct;
mod reboot_criterion_enum;
