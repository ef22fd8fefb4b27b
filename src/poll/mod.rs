// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Poll scheduling and update criteria.
//!
//! The polling loop itself (transport, status reporting) is a collaborator;
//! this module holds the schedule arithmetic and version criteria its
//! behavior is defined by.

// From dependency library
use semver::Version;

// From standard library

// From this library
pub use poll_scheduler_struct::{PollScheduler, POLL_NOW_DELAY, POLL_SHORT_DELAY};
pub use poll_trigger_enum::PollTrigger;

use crate::config::{CandidateCriterion, InstallCriterion};

mod poll_scheduler_struct;
mod poll_trigger_enum;

/// Returns `true` when an offered bundle version makes a poll result an
/// update candidate.
pub fn is_update_candidate(
    installed: &str,
    offered: &str,
    criteria: &[CandidateCriterion],
) -> bool {
    criteria.iter().any(|criterion| match criterion {
        CandidateCriterion::DifferentVersion => offered != installed,
        CandidateCriterion::HigherSemver => version_is_higher(installed, offered),
    })
}

/// Returns `true` when a candidate bundle should actually be installed.
pub fn should_install(installed: &str, offered: &str, criteria: &[InstallCriterion]) -> bool {
    criteria.iter().any(|criterion| match criterion {
        InstallCriterion::Always => true,
        InstallCriterion::DifferentVersion => offered != installed,
        InstallCriterion::HigherSemver => version_is_higher(installed, offered),
    })
}

/// Strict semver comparison; unparseable versions never count as higher.
fn version_is_higher(installed: &str, offered: &str) -> bool {
    match (parse_lenient(installed), parse_lenient(offered)) {
        (Some(installed), Some(offered)) => offered > installed,
        _ => false,
    }
}

/// Accepts a leading `v` and up to two missing components, so `v1.2`
/// compares as `1.2.0`.
fn parse_lenient(version: &str) -> Option<Version> {
    let version = version.trim().trim_start_matches('v');

    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let dots = version.chars().filter(|&c| c == '.').count();
    let padded = match dots {
        0 => format!("{version}.0.0"),
        1 => format!("{version}.0"),
        _ => return None,
    };

    Version::parse(&padded).ok()
}
