// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library
use enum_iterator::Sequence;

// From standard library
use std::fmt;
use std::str::FromStr;

// From this library
use crate::config::ConfigError;

/// When an offered bundle version makes a poll result an update candidate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
#[non_exhaustive]
pub enum CandidateCriterion {
    /// The offered version parses as semver and is strictly higher.
    HigherSemver,
    /// The offered version differs from the installed one.
    DifferentVersion,
}

impl fmt::Display for CandidateCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidateCriterion::HigherSemver => "higher-semver",
            CandidateCriterion::DifferentVersion => "different-version",
        };

        write!(f, "{name}")
    }
}

impl FromStr for CandidateCriterion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "higher-semver" => Ok(CandidateCriterion::HigherSemver),
            "different-version" => Ok(CandidateCriterion::DifferentVersion),
            _ => Err(ConfigError::Invalid(format!(
                "unknown candidate criterion {s:?}"
            ))),
        }
    }
}
