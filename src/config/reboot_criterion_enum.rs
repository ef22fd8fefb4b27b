// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use enum_iterator::Sequence;

// From standard library
use std::fmt;
use std::str::FromStr;

// From this library
use crate::config::ConfigError;

/// When the poll collaborator reboots after handling an update.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
#[non_exhaustive]
pub enum RebootCriterion {
    /// An update was attempted and failed.
    FailedUpdate,
    /// An update wrote at least one slot.
    UpdatedSlots,
    /// An update wrote artifacts outside the slot set.
    UpdatedArtifacts,
}

impl fmt::Display for RebootCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebootCriterion::FailedUpdate => "failed-update",
            RebootCriterion::UpdatedSlots => "updated-slots",
            RebootCriterion::UpdatedArtifacts => "updated-artifacts",
        };

        write!(f, "{name}")
    }
}

impl FromStr for RebootCriterion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failed-update" => Ok(RebootCriterion::FailedUpdate),
            "updated-slots" => Ok(RebootCriterion::UpdatedSlots),
            "updated-artifacts" => Ok(RebootCriterion::UpdatedArtifacts),
            _ => Err(ConfigError::Invalid(format!(
                "unknown reboot criterion {s:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reboot_criterion_round_trips_config_names() -> crate::Result<()> {
        for criterion in enum_iterator::all::<RebootCriterion>() {
            let actual: RebootCriterion = criterion.to_string().parse()?;
            let expected = criterion;
            assert_eq!(actual, expected);
        }

        Ok(())
    }
}
