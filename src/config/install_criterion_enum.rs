// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use enum_iterator::Sequence;

// From standard library
use std::fmt;
use std::str::FromStr;

// From this library
use crate::config::ConfigError;

/// When a candidate bundle is actually installed.
///
/// The set extends the candidate criteria with `always`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
#[non_exhaustive]
pub enum InstallCriterion {
    /// The offered version parses as semver and is strictly higher.
    HigherSemver,
    /// The offered version differs from the installed one.
    DifferentVersion,
    /// Install every candidate.
    Always,
}

impl fmt::Display for InstallCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallCriterion::HigherSemver => "higher-semver",
            InstallCriterion::DifferentVersion => "different-version",
            InstallCriterion::Always => "always",
        };

        write!(f, "{name}")
    }
}

impl FromStr for InstallCriterion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "higher-semver" => Ok(InstallCriterion::HigherSemver),
            "different-version" => Ok(InstallCriterion::DifferentVersion),
            "always" => Ok(InstallCriterion::Always),
            _ => Err(ConfigError::Invalid(format!(
                "unknown install criterion {s:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn install_criterion_round_trips_config_names() -> crate::Result<()> {
        for criterion in enum_iterator::all::<InstallCriterion>() {
            let actual: InstallCriterion = criterion.to_string().parse()?;
            let expected = criterion;
            assert_eq!(actual, expected);
        }

        Ok(())
    }
}
